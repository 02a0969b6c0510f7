//! TLS configuration for TCP channel endpoints
//!
//! Only needed when the channel is a TCP endpoint that terminates TLS at the
//! database side (for example a direct instance address with a per-instance
//! server CA). The platform socket and a localhost auth-proxy carry their own
//! encryption, so most deployments never construct one of these.

use crate::error::ChannelError;
use rustls::{ClientConfig, RootCertStore};
use rustls_pemfile::Item;
use std::sync::Arc;

/// TLS client configuration for a TCP endpoint.
///
/// Built either from the system root store or from a server-CA file such as
/// the instance CA the platform lets operators download.
#[derive(Clone)]
pub struct TlsConfig {
    ca_cert_path: Option<String>,
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Configuration trusting the system root certificates.
    pub fn system_roots() -> Result<Self, ChannelError> {
        let result = rustls_native_certs::load_native_certs();

        let mut store = RootCertStore::empty();
        for cert in result.certs {
            let _ = store.add_parsable_certificates(std::iter::once(cert));
        }
        if store.is_empty() {
            return Err(ChannelError::Tls(
                "no usable system root certificates".into(),
            ));
        }

        Ok(Self {
            ca_cert_path: None,
            client_config: Arc::new(client_config(store)),
        })
    }

    /// Configuration trusting only the CA certificates in a PEM file.
    pub fn with_ca_file(path: &str) -> Result<Self, ChannelError> {
        let pem = std::fs::read(path).map_err(|e| {
            ChannelError::Tls(format!("cannot read CA certificate file '{}': {}", path, e))
        })?;

        let mut reader = std::io::Cursor::new(&pem);
        let mut store = RootCertStore::empty();
        let mut found = 0usize;

        loop {
            match rustls_pemfile::read_one(&mut reader) {
                Ok(Some(Item::X509Certificate(cert))) => {
                    let _ = store.add_parsable_certificates(std::iter::once(cert));
                    found += 1;
                }
                Ok(Some(_)) => {} // Skip non-certificate PEM items
                Ok(None) => break,
                Err(_) => {
                    return Err(ChannelError::Tls(format!(
                        "cannot parse CA certificate from '{}'",
                        path
                    )));
                }
            }
        }

        if found == 0 {
            return Err(ChannelError::Tls(format!(
                "no certificates found in '{}'",
                path
            )));
        }

        Ok(Self {
            ca_cert_path: Some(path.to_string()),
            client_config: Arc::new(client_config(store)),
        })
    }

    /// The compiled rustls client configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }
}

fn client_config(roots: RootCertStore) -> ClientConfig {
    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth()
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_path", &self.ca_cert_path)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_with_ca_file_missing_path() {
        let err = TlsConfig::with_ca_file("/nonexistent/ca.pem").unwrap_err();
        assert!(matches!(err, ChannelError::Tls(_)));
    }

    #[test]
    fn test_with_ca_file_no_certificates() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"not a pem file").expect("write");

        let err = TlsConfig::with_ca_file(file.path().to_str().unwrap()).unwrap_err();
        match err {
            ChannelError::Tls(msg) => assert!(msg.contains("no certificates")),
            other => panic!("expected Tls, got {:?}", other),
        }
    }
}
