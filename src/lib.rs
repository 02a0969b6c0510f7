//! Connection bootstrap for managed Cloud SQL Postgres instances.
//!
//! A stateless process on a serverless platform reaches its database through
//! an authenticated access channel (a per-instance Unix socket mounted by
//! the platform, or a localhost auth-proxy), with identity supplied through
//! environment variables and a service-account key file. This crate owns the
//! startup sequence around that channel:
//!
//! 1. read and validate configuration from the environment ([`config`])
//! 2. resolve and validate the service-account credential ([`credentials`])
//! 3. connect through the channel with bounded, jittered retries
//!    ([`bootstrap`], [`channel`])
//! 4. expose a ready/not-ready signal for the platform's probes ([`health`])
//!
//! # Quick start
//!
//! ```no_run
//! use cloudsql_bootstrap::{Bootstrapper, ChannelConnector, ConnectionConfig, Credential};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), cloudsql_bootstrap::Error> {
//! let config = ConnectionConfig::from_env()?;
//! let credential = Arc::new(Credential::resolve(config.credential_path())?);
//!
//! let bootstrapper = Bootstrapper::new(ChannelConnector::new(&config, credential))
//!     .with_deadline(Duration::from_secs(60));
//!
//! let health = bootstrapper.health_signal();
//! let handle = bootstrapper.connect().await?;
//!
//! assert!(health.is_ready());
//! println!("connected to {:?}", handle.server_version());
//! # Ok(())
//! # }
//! ```
//!
//! Failures are classified: configuration and credential problems abort
//! immediately (they will not fix themselves), transient channel failures are
//! retried with exponential backoff and jitter, and fatal channel failures
//! (bad password, unknown database) fail the bootstrap on the first attempt.

pub mod auth;
pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod credentials;
pub mod error;
pub mod health;
pub mod metrics;
pub mod protocol;

pub use bootstrap::{BootstrapState, Bootstrapper, Connector, RetryPolicy};
pub use channel::{ChannelConnector, ConnectionHandle, Endpoint, TlsConfig};
pub use config::{ConnectionConfig, InstanceName};
pub use credentials::Credential;
pub use error::{
    BootstrapError, ChannelError, ConfigError, ConnectError, CredentialError, Error, FailureClass,
    Result,
};
pub use health::HealthSignal;
