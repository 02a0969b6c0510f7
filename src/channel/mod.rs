//! Access channel to the managed database instance
//!
//! This module handles:
//! * Endpoint resolution (platform socket directory vs TCP proxy)
//! * Transport (Unix socket, TCP, TLS over TCP)
//! * Session establishment (startup, authentication, verification query)
//! * Classification of channel failures into transient vs fatal

mod conn;
mod endpoint;
mod tls;
mod transport;

pub use conn::{classify, ChannelConnector, Connection, ConnectionHandle};
pub use endpoint::{Endpoint, DATABASE_PORT, DEFAULT_SOCKET_DIR};
pub use tls::TlsConfig;
pub use transport::Transport;
