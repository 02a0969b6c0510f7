//! Session-protocol message types

/// Frontend message (client → server)
#[derive(Debug, Clone)]
pub enum FrontendMessage {
    /// Startup message (user, database, application_name, ...)
    Startup {
        /// Protocol version
        version: i32,
        /// Connection parameters
        params: Vec<(String, String)>,
    },

    /// Cleartext password response
    Password(String),

    /// SASL initial response (mechanism selection + client first message)
    SaslInitialResponse {
        /// Mechanism name, e.g. "SCRAM-SHA-256"
        mechanism: String,
        /// Client first message bytes
        data: Vec<u8>,
    },

    /// SASL response (client final message)
    SaslResponse {
        /// Client final message bytes
        data: Vec<u8>,
    },

    /// Simple query (used once, for connection verification)
    Query(String),

    /// SSLRequest (TLS negotiation preamble)
    SslRequest,

    /// Terminate
    Terminate,
}

/// Backend message (server → client)
#[derive(Debug, Clone)]
pub enum BackendMessage {
    /// Authentication request
    Authentication(AuthenticationMessage),

    /// Backend key data (process id + cancellation secret)
    BackendKeyData {
        /// Server process ID
        process_id: i32,
        /// Cancellation secret
        secret_key: i32,
    },

    /// Command complete (tag string, e.g. "SELECT 1")
    CommandComplete(String),

    /// Data row; the bootstrap discards row contents
    DataRow,

    /// Empty query response
    EmptyQueryResponse,

    /// Error response
    ErrorResponse(ErrorFields),

    /// Notice response (non-fatal)
    NoticeResponse(ErrorFields),

    /// Run-time parameter report (server_version, TimeZone, ...)
    ParameterStatus {
        /// Parameter name
        name: String,
        /// Parameter value
        value: String,
    },

    /// Ready for query
    ReadyForQuery {
        /// Transaction status byte
        status: u8,
    },

    /// Row description; the bootstrap discards column metadata
    RowDescription,
}

/// Authentication request sub-messages
#[derive(Debug, Clone)]
pub enum AuthenticationMessage {
    /// Authentication complete
    Ok,

    /// Server wants the password in cleartext
    CleartextPassword,

    /// Server wants an MD5 digest (not supported by this client)
    Md5Password,

    /// Server offers SASL mechanisms
    Sasl {
        /// Mechanism names, e.g. ["SCRAM-SHA-256"]
        mechanisms: Vec<String>,
    },

    /// SASL server challenge
    SaslContinue {
        /// Server first/continue message bytes
        data: Vec<u8>,
    },

    /// SASL server verification
    SaslFinal {
        /// Server final message bytes
        data: Vec<u8>,
    },
}

/// Fields of an error or notice response
#[derive(Debug, Clone, Default)]
pub struct ErrorFields {
    /// Severity (ERROR, FATAL, WARNING, ...)
    pub severity: Option<String>,
    /// SQLSTATE code
    pub code: Option<String>,
    /// Human-readable message
    pub message: Option<String>,
    /// Additional detail
    pub detail: Option<String>,
    /// Hint
    pub hint: Option<String>,
}

impl ErrorFields {
    /// SQLSTATE code, or "XX000" (internal_error) when the server omitted it
    pub fn sqlstate(&self) -> &str {
        self.code.as_deref().unwrap_or("XX000")
    }
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref msg) = self.message {
            write!(f, "{}", msg)?;
        }
        if let Some(ref code) = self.code {
            write!(f, " ({})", code)?;
        }
        Ok(())
    }
}
