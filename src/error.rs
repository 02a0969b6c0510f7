//! Error taxonomy for the bootstrap sequence
//!
//! Three failure families, matching the three phases of startup:
//! * [`ConfigError`]: the environment is wrong; aborts immediately, no retry
//! * [`CredentialError`]: the service-account key file is wrong; same policy
//! * [`BootstrapError`]: the connection sequence failed past its retry budget
//!
//! Transient channel failures are represented as a [`FailureClass`] on
//! [`ConnectError`] and are consumed inside the retry loop; they never
//! surface on their own.

use std::time::Duration;

/// Result alias for crate-level operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Configuration errors (environment is missing or malformed)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is absent or empty
    #[error("missing required environment variable {0}")]
    MissingField(&'static str),

    /// An environment variable is present but its value does not parse
    #[error("environment variable {field} has invalid format: {reason}")]
    InvalidFormat {
        /// Variable name
        field: &'static str,
        /// What the shape check rejected (never contains secret values)
        reason: String,
    },
}

/// Credential file errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// The path does not resolve to a file
    #[error("credential file not found: {path}")]
    NotFound {
        /// The path that was checked
        path: String,
    },

    /// The file exists but cannot be read
    #[error("credential file unreadable: {path}: {reason}")]
    Unreadable {
        /// The path that was checked
        path: String,
        /// The underlying I/O failure, stringified
        reason: String,
    },

    /// The file was read but does not parse as a service-account key
    #[error("credential file malformed: {path}: {reason}")]
    Malformed {
        /// The path that was checked
        path: String,
        /// Parse or shape-check failure (never includes file contents)
        reason: String,
    },
}

/// Classification of a single failed connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth retrying: the channel or instance may simply not be up yet
    Transient,
    /// Retrying cannot help: bad credentials, unknown database, protocol violation
    Fatal,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// A single failed connection attempt, already classified by the channel layer
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ConnectError {
    class: FailureClass,
    message: String,
}

impl ConnectError {
    /// A failure worth retrying
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            message: message.into(),
        }
    }

    /// A failure that retrying cannot fix
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Fatal,
            message: message.into(),
        }
    }

    /// Transient or fatal
    pub fn class(&self) -> FailureClass {
        self.class
    }

    /// Diagnostic message (never contains the password or key material)
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Bootstrap failures that surface to the process entry point
#[derive(Debug, Clone, thiserror::Error)]
pub enum BootstrapError {
    /// A single attempt failed in a way retrying cannot fix
    #[error("connection failed permanently: {0}")]
    Fatal(ConnectError),

    /// Every attempt in the retry budget failed transiently
    #[error("retries exhausted after {attempts} attempts, last error: {last}")]
    RetriesExhausted {
        /// How many attempts were made
        attempts: u32,
        /// The final transient failure
        last: ConnectError,
    },

    /// The overall bootstrap deadline elapsed mid-sequence
    #[error("bootstrap deadline of {deadline:?} exceeded")]
    Timeout {
        /// The configured deadline
        deadline: Duration,
    },
}

/// Wire-level errors inside the access channel.
///
/// These are raw causes; `channel::classify` maps them onto [`FailureClass`]
/// before they reach the retry loop.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// I/O error on the socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server spoke something we did not expect
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Authentication was rejected or could not be completed
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The server reported an error at the database layer
    #[error("database error {code}: {message}")]
    Database {
        /// SQLSTATE code
        code: String,
        /// Server-provided message
        message: String,
    },

    /// TLS configuration or handshake failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server closed the stream mid-handshake
    #[error("connection closed by server")]
    ConnectionClosed,
}

/// Crate-level error umbrella
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Environment configuration problem
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Credential file problem
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Bootstrap sequence failed
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    /// Channel failure outside the bootstrap loop (e.g. during shutdown)
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// I/O error outside the channel (e.g. signal handling)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this error, sysexits-style.
    ///
    /// Distinct codes let the hosting platform tell configuration mistakes
    /// (which will not fix themselves) from transient infrastructure failures
    /// (which a restart may clear).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 78,     // EX_CONFIG
            Error::Credential(_) => 66, // EX_NOINPUT
            Error::Bootstrap(BootstrapError::Fatal(_)) => 69, // EX_UNAVAILABLE
            Error::Bootstrap(BootstrapError::RetriesExhausted { .. })
            | Error::Bootstrap(BootstrapError::Timeout { .. }) => 75, // EX_TEMPFAIL
            Error::Channel(_) | Error::Io(_) => 70, // EX_SOFTWARE
        }
    }
}
