//! Backend message decoding

use super::constants::{auth, tags};
use super::message::{AuthenticationMessage, BackendMessage, ErrorFields};
use bytes::BytesMut;
use std::io;

/// Maximum accepted message length (1 GB), matching PostgreSQL's own
/// `PQ_LARGE_MESSAGE_LIMIT`. Larger length headers are rejected before
/// allocation.
const MAX_MESSAGE_LENGTH: usize = 1_073_741_824;

/// Decode one backend message from the front of `data`.
///
/// Returns the message and the number of bytes consumed; the caller advances
/// the buffer. `ErrorKind::UnexpectedEof` means the buffer holds only part of
/// a message and more bytes must be read first.
pub fn decode_message(data: &BytesMut) -> io::Result<(BackendMessage, usize)> {
    if data.len() < 5 {
        return Err(incomplete("message header"));
    }

    let tag = data[0];
    let len = i32::from_be_bytes([data[1], data[2], data[3], data[4]]) as usize;

    if len > MAX_MESSAGE_LENGTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message length {} exceeds maximum {}", len, MAX_MESSAGE_LENGTH),
        ));
    }
    if data.len() < len + 1 {
        return Err(incomplete("message body"));
    }

    let mut body = Reader::new(&data[5..len + 1]);

    let msg = match tag {
        tags::AUTHENTICATION => decode_authentication(&mut body)?,
        tags::BACKEND_KEY_DATA => BackendMessage::BackendKeyData {
            process_id: body.read_i32()?,
            secret_key: body.read_i32()?,
        },
        tags::COMMAND_COMPLETE => BackendMessage::CommandComplete(body.read_cstr()?),
        tags::DATA_ROW => BackendMessage::DataRow,
        tags::EMPTY_QUERY_RESPONSE => BackendMessage::EmptyQueryResponse,
        tags::ERROR_RESPONSE => BackendMessage::ErrorResponse(decode_error_fields(&mut body)?),
        tags::NOTICE_RESPONSE => BackendMessage::NoticeResponse(decode_error_fields(&mut body)?),
        tags::PARAMETER_STATUS => BackendMessage::ParameterStatus {
            name: body.read_cstr()?,
            value: body.read_cstr()?,
        },
        tags::READY_FOR_QUERY => BackendMessage::ReadyForQuery {
            status: body.read_u8()?,
        },
        tags::ROW_DESCRIPTION => BackendMessage::RowDescription,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown message tag: 0x{:02X}", other),
            ))
        }
    };

    Ok((msg, len + 1))
}

fn decode_authentication(body: &mut Reader<'_>) -> io::Result<BackendMessage> {
    let auth_type = body.read_i32()?;

    let auth_msg = match auth_type {
        auth::OK => AuthenticationMessage::Ok,
        auth::CLEARTEXT_PASSWORD => AuthenticationMessage::CleartextPassword,
        auth::MD5_PASSWORD => AuthenticationMessage::Md5Password,
        auth::SASL => {
            // Mechanism list: null-terminated names, then an empty terminator
            let mut mechanisms = Vec::new();
            loop {
                match body.read_cstr() {
                    Ok(name) if !name.is_empty() => mechanisms.push(name),
                    _ => break,
                }
            }
            AuthenticationMessage::Sasl { mechanisms }
        }
        auth::SASL_CONTINUE => AuthenticationMessage::SaslContinue {
            data: body.rest().to_vec(),
        },
        auth::SASL_FINAL => AuthenticationMessage::SaslFinal {
            data: body.rest().to_vec(),
        },
        other => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported authentication request type: {}", other),
            ))
        }
    };

    Ok(BackendMessage::Authentication(auth_msg))
}

fn decode_error_fields(body: &mut Reader<'_>) -> io::Result<ErrorFields> {
    let mut fields = ErrorFields::default();

    loop {
        let field_type = match body.read_u8() {
            Ok(0) | Err(_) => break,
            Ok(t) => t,
        };
        let value = body.read_cstr()?;

        match field_type {
            b'S' => fields.severity = Some(value),
            b'C' => fields.code = Some(value),
            b'M' => fields.message = Some(value),
            b'D' => fields.detail = Some(value),
            b'H' => fields.hint = Some(value),
            _ => {} // Ignore fields the bootstrap does not report
        }
    }

    Ok(fields)
}

fn incomplete(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, format!("incomplete {}", what))
}

/// Cursor over a message body
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u8(&mut self) -> io::Result<u8> {
        let byte = *self.data.get(self.pos).ok_or_else(|| incomplete("byte"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_i32(&mut self) -> io::Result<i32> {
        let end = self.pos + 4;
        if end > self.data.len() {
            return Err(incomplete("i32"));
        }
        let value = i32::from_be_bytes(self.data[self.pos..end].try_into().unwrap());
        self.pos = end;
        Ok(value)
    }

    fn read_cstr(&mut self) -> io::Result<String> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unterminated string"))?;
        let value = String::from_utf8_lossy(&rest[..end]).to_string();
        self.pos += end + 1;
        Ok(value)
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }
}
