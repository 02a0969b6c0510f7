//! SCRAM-SHA-256 client (RFC 5802), as used by Postgres 10+ SASL
//! authentication.
//!
//! Channel binding is not offered: the bootstrap's channel is a platform
//! socket or localhost proxy, so the exchange always uses the `n` (no
//! binding) GS2 header.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2;
use rand::Rng;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// SCRAM exchange failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScramError {
    /// Server message did not have the expected shape
    #[error("invalid server message: {0}")]
    InvalidServerMessage(String),

    /// Server signature did not verify
    #[error("server signature verification failed")]
    InvalidServerSignature,
}

/// Exchange phases, enforced by consuming `self` between steps
enum Phase {
    /// Before the server first message
    Initial,
    /// After the client final message was produced
    AwaitingVerification {
        server_key: [u8; 32],
        auth_message: String,
    },
}

/// SCRAM-SHA-256 client state for one authentication exchange.
///
/// Call order: [`client_first`](Self::client_first) →
/// [`client_final`](Self::client_final) →
/// [`verify_server_final`](Self::verify_server_final).
pub struct ScramClient {
    password: String,
    nonce: String,
    phase: Phase,
}

impl ScramClient {
    /// Start a new exchange for `password`.
    ///
    /// The username is deliberately not carried in the SCRAM messages
    /// (`n=`): Postgres takes the user from the startup message and expects
    /// an empty name here.
    pub fn new(password: impl Into<String>) -> Self {
        let nonce_bytes: [u8; 18] = rand::thread_rng().gen();
        Self {
            password: password.into(),
            nonce: BASE64.encode(nonce_bytes),
            phase: Phase::Initial,
        }
    }

    /// Client first message: `n,,n=,r=<nonce>`
    pub fn client_first(&self) -> String {
        format!("n,,n=,r={}", self.nonce)
    }

    /// Consume the server first message and produce the client final message.
    pub fn client_final(&mut self, server_first: &str) -> Result<String, ScramError> {
        let (server_nonce, salt_b64, iterations) = parse_server_first(server_first)?;

        if !server_nonce.starts_with(&self.nonce) {
            return Err(ScramError::InvalidServerMessage(
                "server nonce does not extend client nonce".into(),
            ));
        }
        let salt = BASE64
            .decode(salt_b64)
            .map_err(|_| ScramError::InvalidServerMessage("salt is not valid base64".into()))?;

        // SaltedPassword := PBKDF2(password, salt, i)
        let mut salted = [0u8; 32];
        let _ = pbkdf2::<HmacSha256>(self.password.as_bytes(), &salt, iterations, &mut salted);

        // ClientKey, StoredKey, ServerKey per RFC 5802 §3
        let client_key = hmac(&salted, b"Client Key");
        let stored_key: [u8; 32] = Sha256::digest(client_key).into();
        let server_key = hmac(&salted, b"Server Key");

        // AuthMessage := client-first-bare + "," + server-first + "," + client-final-without-proof
        let without_proof = format!("c=biws,r={}", server_nonce); // biws = base64("n,,")
        let auth_message = format!("n=,r={},{},{}", self.nonce, server_first, without_proof);

        // ClientProof := ClientKey XOR HMAC(StoredKey, AuthMessage)
        let signature = hmac(&stored_key, auth_message.as_bytes());
        let mut proof = client_key;
        for (p, s) in proof.iter_mut().zip(signature.iter()) {
            *p ^= s;
        }

        self.phase = Phase::AwaitingVerification {
            server_key,
            auth_message,
        };

        Ok(format!("{},p={}", without_proof, BASE64.encode(proof)))
    }

    /// Verify the server final message (`v=<signature>`).
    pub fn verify_server_final(&self, server_final: &str) -> Result<(), ScramError> {
        let (server_key, auth_message) = match &self.phase {
            Phase::AwaitingVerification {
                server_key,
                auth_message,
            } => (server_key, auth_message),
            Phase::Initial => {
                return Err(ScramError::InvalidServerMessage(
                    "server final message before client final".into(),
                ))
            }
        };

        let encoded = server_final.strip_prefix("v=").ok_or_else(|| {
            ScramError::InvalidServerMessage("missing 'v=' prefix".into())
        })?;
        let signature = BASE64
            .decode(encoded)
            .map_err(|_| ScramError::InvalidServerMessage("signature is not valid base64".into()))?;

        let expected = hmac(server_key, auth_message.as_bytes());
        if constant_time_eq(&signature, &expected) {
            Ok(())
        } else {
            Err(ScramError::InvalidServerSignature)
        }
    }
}

/// Parse `r=<nonce>,s=<salt>,i=<iterations>` in any field order
fn parse_server_first(msg: &str) -> Result<(&str, &str, u32), ScramError> {
    let mut nonce = None;
    let mut salt = None;
    let mut iterations = None;

    for part in msg.split(',') {
        if let Some(v) = part.strip_prefix("r=") {
            nonce = Some(v);
        } else if let Some(v) = part.strip_prefix("s=") {
            salt = Some(v);
        } else if let Some(v) = part.strip_prefix("i=") {
            iterations = v.parse::<u32>().ok();
        }
    }

    match (nonce, salt, iterations) {
        (Some(n), Some(s), Some(i)) if !n.is_empty() && !s.is_empty() => Ok((n, s, i)),
        _ => Err(ScramError::InvalidServerMessage(
            "expected r=<nonce>,s=<salt>,i=<iterations>".into(),
        )),
    }
}

fn hmac(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Constant-time comparison to avoid leaking signature prefixes
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Server-side SCRAM math, for exercising the client against a
    /// synthetic but arithmetically correct peer
    fn server_first_and_final(
        client_first: &str,
        password: &str,
        salt: &[u8],
        iterations: u32,
    ) -> (String, impl FnOnce(&str) -> String) {
        let client_nonce = client_first
            .split(",r=")
            .nth(1)
            .expect("client nonce")
            .to_string();
        let server_nonce = format!("{}srvext", client_nonce);
        let server_first = format!(
            "r={},s={},i={}",
            server_nonce,
            BASE64.encode(salt),
            iterations
        );

        let mut salted = [0u8; 32];
        let _ = pbkdf2::<HmacSha256>(password.as_bytes(), salt, iterations, &mut salted);
        let server_key = hmac(&salted, b"Server Key");

        let sf = server_first.clone();
        let make_final = move |client_final: &str| {
            let without_proof = client_final
                .rsplit_once(",p=")
                .expect("client proof")
                .0
                .to_string();
            let auth_message = format!("n=,r={},{},{}", client_nonce, sf, without_proof);
            let signature = hmac(&server_key, auth_message.as_bytes());
            format!("v={}", BASE64.encode(signature))
        };

        (server_first, make_final)
    }

    #[test]
    fn test_client_first_format() {
        let client = ScramClient::new("secret");
        let first = client.client_first();

        assert!(first.starts_with("n,,n=,r="));
        // 18 random bytes base64-encode to 24 characters
        assert_eq!(first.len(), "n,,n=,r=".len() + 24);
    }

    #[test]
    fn test_nonces_are_unique() {
        let a = ScramClient::new("x").client_first();
        let b = ScramClient::new("x").client_first();
        assert_ne!(a, b);
    }

    #[test]
    fn test_full_exchange_verifies() {
        let mut client = ScramClient::new("tiger");
        let first = client.client_first();

        let (server_first, make_final) =
            server_first_and_final(&first, "tiger", b"0123456789ab", 4096);

        let client_final = client.client_final(&server_first).unwrap();
        assert!(client_final.starts_with("c=biws,r="));
        assert!(client_final.contains(",p="));

        let server_final = make_final(&client_final);
        client.verify_server_final(&server_final).unwrap();
    }

    #[test]
    fn test_wrong_server_signature_rejected() {
        let mut client = ScramClient::new("tiger");
        let first = client.client_first();

        let (server_first, _) = server_first_and_final(&first, "tiger", b"0123456789ab", 4096);
        let _ = client.client_final(&server_first).unwrap();

        let bogus = format!("v={}", BASE64.encode([0u8; 32]));
        assert!(matches!(
            client.verify_server_final(&bogus),
            Err(ScramError::InvalidServerSignature)
        ));
    }

    #[test]
    fn test_tampered_server_nonce_rejected() {
        let mut client = ScramClient::new("tiger");
        let _ = client.client_first();

        let server_first = format!("r=TAMPERED,s={},i=4096", BASE64.encode(b"salt"));
        assert!(matches!(
            client.client_final(&server_first),
            Err(ScramError::InvalidServerMessage(_))
        ));
    }

    #[test]
    fn test_malformed_server_first_rejected() {
        let mut client = ScramClient::new("tiger");
        let _ = client.client_first();

        for bad in ["", "r=abc,s=c2FsdA==", "r=abc,i=4096", "r=,s=,i=", "x=1,y=2"] {
            assert!(
                client.client_final(bad).is_err(),
                "expected rejection of '{}'",
                bad
            );
        }
    }

    #[test]
    fn test_invalid_salt_base64_rejected() {
        let mut client = ScramClient::new("tiger");
        let first = client.client_first();
        let nonce = first.split(",r=").nth(1).unwrap();

        let server_first = format!("r={}ext,s=!!!,i=4096", nonce);
        assert!(matches!(
            client.client_final(&server_first),
            Err(ScramError::InvalidServerMessage(_))
        ));
    }

    #[test]
    fn test_server_final_before_client_final_rejected() {
        let client = ScramClient::new("tiger");
        assert!(client.verify_server_final("v=AAAA").is_err());
    }

    #[test]
    fn test_missing_v_prefix_rejected() {
        let mut client = ScramClient::new("tiger");
        let first = client.client_first();
        let (server_first, _) = server_first_and_final(&first, "tiger", b"saltsalt", 1);
        let _ = client.client_final(&server_first).unwrap();

        assert!(matches!(
            client.verify_server_final("signature-without-prefix"),
            Err(ScramError::InvalidServerMessage(_))
        ));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"same", b"same"));
        assert!(!constant_time_eq(b"same", b"diff"));
        assert!(!constant_time_eq(b"short", b"longer"));
        assert!(constant_time_eq(&[], &[]));
    }
}
