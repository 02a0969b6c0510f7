//! Byte transport over the access channel (Unix socket, TCP, TLS over TCP)

use crate::error::ChannelError;
use bytes::BytesMut;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};

/// Transport layer abstraction
#[allow(clippy::large_enum_variant)]
pub enum Transport {
    /// Plain TCP stream (proxy endpoints, or pre-TLS-upgrade)
    Tcp(TcpStream),
    /// TLS-encrypted TCP stream
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
    /// Unix domain socket (platform socket directory)
    Unix(UnixStream),
}

impl Transport {
    /// Connect via TCP
    pub async fn connect_tcp(host: &str, port: u16) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Transport::Tcp(stream))
    }

    /// Connect via Unix socket
    pub async fn connect_unix(path: &Path) -> Result<Self, ChannelError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Transport::Unix(stream))
    }

    /// Upgrade a plain TCP transport to TLS after SSLRequest negotiation.
    ///
    /// Consumes `self`; only valid on a plain TCP transport.
    pub async fn upgrade_to_tls(
        self,
        tls: &super::TlsConfig,
        hostname: &str,
    ) -> Result<Self, ChannelError> {
        let stream = match self {
            Transport::Tcp(stream) => stream,
            Transport::Tls(_) => {
                return Err(ChannelError::Tls("transport is already TLS-encrypted".into()))
            }
            Transport::Unix(_) => {
                return Err(ChannelError::Tls("cannot upgrade a Unix socket to TLS".into()))
            }
        };

        let server_name = rustls_pki_types::ServerName::try_from(hostname.to_string())
            .map_err(|_| ChannelError::Tls(format!("invalid hostname for TLS: '{}'", hostname)))?;

        let connector = tokio_rustls::TlsConnector::from(tls.client_config());
        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ChannelError::Tls(format!("TLS handshake failed: {}", e)))?;

        Ok(Transport::Tls(tls_stream))
    }

    /// Write all bytes to the transport
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), ChannelError> {
        match self {
            Transport::Tcp(stream) => stream.write_all(buf).await?,
            Transport::Tls(stream) => stream.write_all(buf).await?,
            Transport::Unix(stream) => stream.write_all(buf).await?,
        }
        Ok(())
    }

    /// Flush the transport
    pub async fn flush(&mut self) -> Result<(), ChannelError> {
        match self {
            Transport::Tcp(stream) => stream.flush().await?,
            Transport::Tls(stream) => stream.flush().await?,
            Transport::Unix(stream) => stream.flush().await?,
        }
        Ok(())
    }

    /// Read bytes into buffer; 0 means the peer closed the stream
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize, ChannelError> {
        let n = match self {
            Transport::Tcp(stream) => stream.read_buf(buf).await?,
            Transport::Tls(stream) => stream.read_buf(buf).await?,
            Transport::Unix(stream) => stream.read_buf(buf).await?,
        };
        Ok(n)
    }

    /// Shut down the transport
    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        match self {
            Transport::Tcp(stream) => stream.shutdown().await?,
            Transport::Tls(stream) => stream.shutdown().await?,
            Transport::Unix(stream) => stream.shutdown().await?,
        }
        Ok(())
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp(_) => f.write_str("Transport::Tcp"),
            Transport::Tls(_) => f.write_str("Transport::Tls"),
            Transport::Unix(_) => f.write_str("Transport::Unix"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_connect_refused() {
        // Port 1 is essentially never listening
        let result = Transport::connect_tcp("127.0.0.1", 1).await;
        assert!(matches!(result, Err(ChannelError::Io(_))));
    }

    #[tokio::test]
    async fn test_unix_connect_missing_socket() {
        let result = Transport::connect_unix(Path::new("/nonexistent/.s.PGSQL.5432")).await;
        match result {
            Err(ChannelError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected Io error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unix_socket_cannot_upgrade_to_tls() {
        let (left, _right) = UnixStream::pair().expect("socket pair");
        let tls = match super::super::TlsConfig::system_roots() {
            Ok(tls) => tls,
            // No system roots in a scratch container; nothing to assert against
            Err(_) => return,
        };

        let transport = Transport::Unix(left);
        let result = transport.upgrade_to_tls(&tls, "example.com").await;
        assert!(matches!(result, Err(ChannelError::Tls(_))));
    }
}
