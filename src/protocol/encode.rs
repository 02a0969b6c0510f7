//! Frontend message encoding

use super::constants::SSL_REQUEST_CODE;
use super::message::FrontendMessage;
use bytes::{BufMut, BytesMut};

/// Encode a frontend message into a fresh buffer
pub fn encode_message(msg: &FrontendMessage) -> BytesMut {
    let mut buf = BytesMut::new();

    match msg {
        FrontendMessage::Startup { version, params } => {
            // Startup has no tag byte; length covers everything including itself
            let body_start = reserve_length(&mut buf);
            buf.put_i32(*version);
            for (key, value) in params {
                put_cstr(&mut buf, key);
                put_cstr(&mut buf, value);
            }
            buf.put_u8(0);
            patch_length(&mut buf, body_start);
        }
        FrontendMessage::Password(password) => {
            tagged(&mut buf, b'p', |buf| put_cstr(buf, password));
        }
        FrontendMessage::SaslInitialResponse { mechanism, data } => {
            tagged(&mut buf, b'p', |buf| {
                put_cstr(buf, mechanism);
                buf.put_i32(data.len() as i32);
                buf.put_slice(data);
            });
        }
        FrontendMessage::SaslResponse { data } => {
            tagged(&mut buf, b'p', |buf| buf.put_slice(data));
        }
        FrontendMessage::Query(query) => {
            tagged(&mut buf, b'Q', |buf| put_cstr(buf, query));
        }
        FrontendMessage::SslRequest => {
            buf.put_i32(8);
            buf.put_i32(SSL_REQUEST_CODE);
        }
        FrontendMessage::Terminate => {
            buf.put_u8(b'X');
            buf.put_i32(4);
        }
    }

    buf
}

/// Write a tag byte, reserve the length word, run `body`, patch the length
fn tagged(buf: &mut BytesMut, tag: u8, body: impl FnOnce(&mut BytesMut)) {
    buf.put_u8(tag);
    let body_start = reserve_length(buf);
    body(buf);
    patch_length(buf, body_start);
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put(s.as_bytes());
    buf.put_u8(0);
}

fn reserve_length(buf: &mut BytesMut) -> usize {
    let pos = buf.len();
    buf.put_i32(0);
    pos
}

fn patch_length(buf: &mut BytesMut, len_pos: usize) {
    let len = (buf.len() - len_pos) as i32;
    buf[len_pos..len_pos + 4].copy_from_slice(&len.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PROTOCOL_VERSION;

    #[test]
    fn test_encode_startup() {
        let msg = FrontendMessage::Startup {
            version: PROTOCOL_VERSION,
            params: vec![
                ("user".to_string(), "svc".to_string()),
                ("database".to_string(), "reviews".to_string()),
            ],
        };
        let buf = encode_message(&msg);

        // Length covers the whole message
        let len = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        assert_eq!(len as usize, buf.len());
        // Version follows the length word
        let version = i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        assert_eq!(version, PROTOCOL_VERSION);
        // Body ends with the final null terminator
        assert_eq!(buf[buf.len() - 1], 0);
        // Null-terminated key/value pairs
        assert!(buf.windows(5).any(|w| w == b"user\0"));
        assert!(buf.windows(8).any(|w| w == b"reviews\0"));
    }

    #[test]
    fn test_encode_password() {
        let buf = encode_message(&FrontendMessage::Password("secret".to_string()));

        assert_eq!(buf[0], b'p');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len as usize, buf.len() - 1);
        assert_eq!(&buf[5..], b"secret\0");
    }

    #[test]
    fn test_encode_sasl_initial_response() {
        let buf = encode_message(&FrontendMessage::SaslInitialResponse {
            mechanism: "SCRAM-SHA-256".to_string(),
            data: b"n,,n=,r=abc".to_vec(),
        });

        assert_eq!(buf[0], b'p');
        // Mechanism name is null-terminated, then a length-prefixed payload
        assert!(buf.windows(14).any(|w| w == b"SCRAM-SHA-256\0"));
        let payload_len_pos = 5 + "SCRAM-SHA-256".len() + 1;
        let payload_len = i32::from_be_bytes([
            buf[payload_len_pos],
            buf[payload_len_pos + 1],
            buf[payload_len_pos + 2],
            buf[payload_len_pos + 3],
        ]);
        assert_eq!(payload_len as usize, b"n,,n=,r=abc".len());
    }

    #[test]
    fn test_encode_query() {
        let buf = encode_message(&FrontendMessage::Query("SELECT 1".to_string()));

        assert_eq!(buf[0], b'Q');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len as usize, buf.len() - 1);
    }

    #[test]
    fn test_encode_ssl_request() {
        let buf = encode_message(&FrontendMessage::SslRequest);

        assert_eq!(buf.len(), 8);
        assert_eq!(&buf[0..4], &[0x00, 0x00, 0x00, 0x08]);
        assert_eq!(&buf[4..8], &[0x04, 0xD2, 0x16, 0x2F]);
    }

    #[test]
    fn test_encode_terminate() {
        let buf = encode_message(&FrontendMessage::Terminate);

        assert_eq!(buf[0], b'X');
        assert_eq!(buf.len(), 5);
    }
}
