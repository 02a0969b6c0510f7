//! Endpoint resolution for the access channel
//!
//! The instance identifier names the channel, not a network address. By
//! default the platform mounts a per-instance Unix socket directory under
//! `/cloudsql`; a TCP endpoint (auth-proxy sidecar, or a direct address with
//! TLS) is used only when the configuration asks for one.

use super::tls::TlsConfig;
use super::transport::Transport;
use crate::config::{ConnectionConfig, InstanceName};
use crate::error::ChannelError;
use std::path::{Path, PathBuf};

/// Default platform mount point for per-instance socket directories
pub const DEFAULT_SOCKET_DIR: &str = "/cloudsql";

/// Database port; also the suffix of the socket file name
pub const DATABASE_PORT: u16 = 5432;

/// Resolved channel endpoint
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// Unix socket file
    Unix {
        /// Full path to the socket file
        path: PathBuf,
    },
    /// TCP address, optionally with TLS
    Tcp {
        /// Host name or address
        host: String,
        /// Port
        port: u16,
        /// TLS configuration; `None` means plaintext (localhost proxy)
        tls: Option<TlsConfig>,
    },
}

impl Endpoint {
    /// Resolve the endpoint for a configuration.
    ///
    /// Priority: `DB_HOST`/`DB_PORT` (TCP proxy) → `INSTANCE_UNIX_SOCKET`
    /// (explicit socket directory) → the default platform mount for the
    /// instance connection name.
    pub fn resolve(config: &ConnectionConfig) -> Self {
        if let Some(host) = &config.tcp_host {
            return Endpoint::Tcp {
                host: host.clone(),
                port: config.tcp_port.unwrap_or(DATABASE_PORT),
                tls: None,
            };
        }
        if let Some(dir) = &config.unix_socket {
            return Endpoint::Unix {
                path: socket_file(dir),
            };
        }
        Endpoint::for_instance(&config.instance)
    }

    /// The default platform socket for an instance:
    /// `/cloudsql/<project>:<region>:<instance>/.s.PGSQL.5432`
    pub fn for_instance(instance: &InstanceName) -> Self {
        let dir = Path::new(DEFAULT_SOCKET_DIR).join(instance.to_string());
        Endpoint::Unix {
            path: socket_file(&dir),
        }
    }

    /// Attach a TLS configuration; only meaningful on TCP endpoints.
    pub fn with_tls(self, tls: TlsConfig) -> Self {
        match self {
            Endpoint::Tcp { host, port, .. } => Endpoint::Tcp {
                host,
                port,
                tls: Some(tls),
            },
            unix => unix,
        }
    }

    /// TLS configuration, if any
    pub fn tls(&self) -> Option<&TlsConfig> {
        match self {
            Endpoint::Tcp { tls, .. } => tls.as_ref(),
            Endpoint::Unix { .. } => None,
        }
    }

    /// Hostname for TLS server-name indication (TCP endpoints only)
    pub fn hostname(&self) -> Option<&str> {
        match self {
            Endpoint::Tcp { host, .. } => Some(host),
            Endpoint::Unix { .. } => None,
        }
    }

    /// Open the transport for this endpoint
    pub async fn open(&self) -> Result<Transport, ChannelError> {
        match self {
            Endpoint::Unix { path } => Transport::connect_unix(path).await,
            Endpoint::Tcp { host, port, .. } => Transport::connect_tcp(host, *port).await,
        }
    }
}

/// Socket directories hold one socket file per listening port
fn socket_file(dir: &Path) -> PathBuf {
    dir.join(format!(".s.PGSQL.{}", DATABASE_PORT))
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Unix { path } => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp {
                host,
                port,
                tls: Some(_),
            } => write!(f, "tls:{}:{}", host, port),
            Endpoint::Tcp {
                host,
                port,
                tls: None,
            } => write!(f, "tcp:{}:{}", host, port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            instance: "proj:us-central1:inst".parse().unwrap(),
            database: "reviews".to_string(),
            user: "svc".to_string(),
            password: SecretString::new("pw".to_string()),
            credential_path: PathBuf::from("/secrets/key.json"),
            listen_port: 8080,
            unix_socket: None,
            tcp_host: None,
            tcp_port: None,
        }
    }

    #[test]
    fn test_default_socket_path_from_instance_name() {
        let endpoint = Endpoint::resolve(&config());
        match endpoint {
            Endpoint::Unix { path } => assert_eq!(
                path,
                PathBuf::from("/cloudsql/proj:us-central1:inst/.s.PGSQL.5432")
            ),
            other => panic!("expected Unix endpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_socket_dir_override() {
        let mut c = config();
        c.unix_socket = Some(PathBuf::from("/tmp/csql"));

        match Endpoint::resolve(&c) {
            Endpoint::Unix { path } => {
                assert_eq!(path, PathBuf::from("/tmp/csql/.s.PGSQL.5432"))
            }
            other => panic!("expected Unix endpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_tcp_override_wins() {
        let mut c = config();
        c.unix_socket = Some(PathBuf::from("/tmp/csql"));
        c.tcp_host = Some("127.0.0.1".to_string());

        match Endpoint::resolve(&c) {
            Endpoint::Tcp { host, port, tls } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(port, DATABASE_PORT);
                assert!(tls.is_none());
            }
            other => panic!("expected Tcp endpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_tcp_port_override() {
        let mut c = config();
        c.tcp_host = Some("10.0.0.5".to_string());
        c.tcp_port = Some(5433);

        match Endpoint::resolve(&c) {
            Endpoint::Tcp { port, .. } => assert_eq!(port, 5433),
            other => panic!("expected Tcp endpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Endpoint::resolve(&config()).to_string(),
            "unix:/cloudsql/proj:us-central1:inst/.s.PGSQL.5432"
        );

        let mut c = config();
        c.tcp_host = Some("127.0.0.1".to_string());
        assert_eq!(Endpoint::resolve(&c).to_string(), "tcp:127.0.0.1:5432");
    }
}
