//! Session establishment over the access channel
//!
//! A straight-line handshake: open transport, optionally negotiate TLS,
//! send the startup message, satisfy the server's authentication request,
//! drain the session preamble, then verify the session with one trivial
//! query round-trip. Every failure is classified transient or fatal before
//! it reaches the retry loop.

use super::endpoint::Endpoint;
use super::tls::TlsConfig;
use super::transport::Transport;
use crate::auth::ScramClient;
use crate::bootstrap::Connector;
use crate::config::ConnectionConfig;
use crate::credentials::Credential;
use crate::error::{ChannelError, ConnectError, FailureClass};
use crate::protocol::{
    decode_message, encode_message, AuthenticationMessage, BackendMessage, FrontendMessage,
    PROTOCOL_VERSION,
};
use bytes::{Buf, BytesMut};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

/// Name reported to the server for its connection logs
const APPLICATION_NAME: &str = "cloudsql-bootstrap";

/// Query used to verify a session before it is surfaced
const VERIFICATION_QUERY: &str = "SELECT 1";

/// Classify a channel failure for the retry loop.
///
/// Transient: the channel or the instance may simply not be up yet (socket
/// not mounted, proxy starting, instance in startup, connection slots
/// briefly exhausted). Fatal: retrying cannot change the outcome (bad
/// credentials, unknown database, protocol or TLS violation). Unknown
/// SQLSTATEs default to fatal so a genuine server error cannot spin the
/// retry loop.
pub fn classify(err: &ChannelError) -> FailureClass {
    match err {
        ChannelError::Io(e) => match e.kind() {
            std::io::ErrorKind::PermissionDenied => FailureClass::Fatal,
            _ => FailureClass::Transient,
        },
        ChannelError::ConnectionClosed => FailureClass::Transient,
        ChannelError::Database { code, .. } => classify_sqlstate(code),
        ChannelError::Authentication(_) | ChannelError::Protocol(_) | ChannelError::Tls(_) => {
            FailureClass::Fatal
        }
    }
}

fn classify_sqlstate(code: &str) -> FailureClass {
    // 57P03 cannot_connect_now: instance still starting
    // class 08: connection exception
    // class 53: insufficient resources (e.g. 53300 too_many_connections)
    if code == "57P03" || code.starts_with("08") || code.starts_with("53") {
        FailureClass::Transient
    } else {
        FailureClass::Fatal
    }
}

/// One session with the database server
pub struct Connection {
    transport: Transport,
    read_buf: BytesMut,
    server_params: HashMap<String, String>,
    process_id: Option<i32>,
}

impl Connection {
    /// Create a connection over an open transport
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            read_buf: BytesMut::with_capacity(8192),
            server_params: HashMap::new(),
            process_id: None,
        }
    }

    /// Send the startup message, authenticate, and drain the session
    /// preamble up to ReadyForQuery.
    pub async fn startup(
        &mut self,
        user: &str,
        database: &str,
        password: &SecretString,
    ) -> Result<(), ChannelError> {
        async {
            let params = vec![
                ("user".to_string(), user.to_string()),
                ("database".to_string(), database.to_string()),
                ("application_name".to_string(), APPLICATION_NAME.to_string()),
            ];
            self.send_message(&FrontendMessage::Startup {
                version: PROTOCOL_VERSION,
                params,
            })
            .await?;

            self.authenticate(password).await?;
            tracing::debug!("session established");
            Ok(())
        }
        .instrument(tracing::debug_span!("startup", user = %user, database = %database))
        .await
    }

    /// Authentication loop: satisfy the server's request, then read until
    /// ReadyForQuery.
    async fn authenticate(&mut self, password: &SecretString) -> Result<(), ChannelError> {
        let auth_start = std::time::Instant::now();
        let mut mechanism = "none";

        loop {
            let msg = self.receive_message().await?;

            match msg {
                BackendMessage::Authentication(auth) => match auth {
                    AuthenticationMessage::Ok => {
                        crate::metrics::counters::auth_successful(mechanism);
                        crate::metrics::histograms::auth_duration(
                            mechanism,
                            auth_start.elapsed().as_millis() as u64,
                        );
                        // Keep reading: ParameterStatus, BackendKeyData and
                        // ReadyForQuery still follow
                    }
                    AuthenticationMessage::CleartextPassword => {
                        mechanism = crate::metrics::labels::MECHANISM_CLEARTEXT;
                        crate::metrics::counters::auth_attempted(mechanism);
                        let msg =
                            FrontendMessage::Password(password.expose_secret().clone());
                        self.send_message(&msg).await?;
                    }
                    AuthenticationMessage::Md5Password => {
                        return Err(ChannelError::Authentication(
                            "MD5 authentication not supported; use SCRAM-SHA-256 or cleartext"
                                .into(),
                        ));
                    }
                    AuthenticationMessage::Sasl { mechanisms } => {
                        mechanism = crate::metrics::labels::MECHANISM_SCRAM;
                        crate::metrics::counters::auth_attempted(mechanism);
                        self.handle_sasl(&mechanisms, password).await?;
                    }
                    AuthenticationMessage::SaslContinue { .. }
                    | AuthenticationMessage::SaslFinal { .. } => {
                        return Err(ChannelError::Protocol(
                            "SASL continuation outside of a SASL exchange".into(),
                        ));
                    }
                },
                BackendMessage::ParameterStatus { name, value } => {
                    self.server_params.insert(name, value);
                }
                BackendMessage::BackendKeyData {
                    process_id,
                    secret_key: _,
                } => {
                    self.process_id = Some(process_id);
                }
                BackendMessage::NoticeResponse(notice) => {
                    tracing::debug!(notice = %notice, "server notice during startup");
                }
                BackendMessage::ReadyForQuery { .. } => break,
                BackendMessage::ErrorResponse(err) => {
                    crate::metrics::counters::auth_failed(mechanism, "server_error");
                    return Err(ChannelError::Database {
                        code: err.sqlstate().to_string(),
                        message: err.to_string(),
                    });
                }
                other => {
                    return Err(ChannelError::Protocol(format!(
                        "unexpected message during authentication: {:?}",
                        other
                    )));
                }
            }
        }

        Ok(())
    }

    /// SCRAM-SHA-256 exchange over the SASL envelope
    async fn handle_sasl(
        &mut self,
        mechanisms: &[String],
        password: &SecretString,
    ) -> Result<(), ChannelError> {
        if !mechanisms.iter().any(|m| m == "SCRAM-SHA-256") {
            return Err(ChannelError::Authentication(format!(
                "server offers no supported SASL mechanism (offered: {})",
                mechanisms.join(", ")
            )));
        }

        let mut scram = ScramClient::new(password.expose_secret().clone());

        let msg = FrontendMessage::SaslInitialResponse {
            mechanism: "SCRAM-SHA-256".to_string(),
            data: scram.client_first().into_bytes(),
        };
        self.send_message(&msg).await?;

        let server_first = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslContinue { data }) => {
                utf8(data)?
            }
            BackendMessage::ErrorResponse(err) => {
                return Err(ChannelError::Database {
                    code: err.sqlstate().to_string(),
                    message: err.to_string(),
                })
            }
            other => {
                return Err(ChannelError::Protocol(format!(
                    "expected SASL challenge, got {:?}",
                    other
                )))
            }
        };

        let client_final = scram
            .client_final(&server_first)
            .map_err(|e| ChannelError::Authentication(e.to_string()))?;
        self.send_message(&FrontendMessage::SaslResponse {
            data: client_final.into_bytes(),
        })
        .await?;

        let server_final = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslFinal { data }) => {
                utf8(data)?
            }
            BackendMessage::ErrorResponse(err) => {
                return Err(ChannelError::Database {
                    code: err.sqlstate().to_string(),
                    message: err.to_string(),
                })
            }
            other => {
                return Err(ChannelError::Protocol(format!(
                    "expected SASL verification, got {:?}",
                    other
                )))
            }
        };

        scram
            .verify_server_final(&server_final)
            .map_err(|e| ChannelError::Authentication(e.to_string()))?;

        tracing::debug!("SCRAM-SHA-256 authentication complete");
        Ok(())
    }

    /// Run the verification query and drain its response.
    ///
    /// The session is only surfaced to the application after this round-trip
    /// completes, so "connected" always means "usable".
    pub async fn verify(&mut self) -> Result<(), ChannelError> {
        self.send_message(&FrontendMessage::Query(VERIFICATION_QUERY.to_string()))
            .await?;

        let mut failure: Option<ChannelError> = None;

        loop {
            match self.receive_message().await? {
                BackendMessage::ReadyForQuery { .. } => break,
                BackendMessage::ErrorResponse(err) => {
                    // Drain to ReadyForQuery before surfacing
                    failure.get_or_insert(ChannelError::Database {
                        code: err.sqlstate().to_string(),
                        message: err.to_string(),
                    });
                }
                BackendMessage::RowDescription
                | BackendMessage::DataRow
                | BackendMessage::CommandComplete(_)
                | BackendMessage::EmptyQueryResponse
                | BackendMessage::NoticeResponse(_)
                | BackendMessage::ParameterStatus { .. } => {}
                other => {
                    failure.get_or_insert(ChannelError::Protocol(format!(
                        "unexpected message during verification: {:?}",
                        other
                    )));
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Server run-time parameter reported during startup
    pub fn server_parameter(&self, name: &str) -> Option<&str> {
        self.server_params.get(name).map(String::as_str)
    }

    /// Server backend process ID
    pub fn backend_pid(&self) -> Option<i32> {
        self.process_id
    }

    /// Close the session politely
    pub async fn close(mut self) -> Result<(), ChannelError> {
        let _ = self.send_message(&FrontendMessage::Terminate).await;
        self.transport.shutdown().await
    }

    async fn send_message(&mut self, msg: &FrontendMessage) -> Result<(), ChannelError> {
        let buf = encode_message(msg);
        self.transport.write_all(&buf).await?;
        self.transport.flush().await
    }

    async fn receive_message(&mut self) -> Result<BackendMessage, ChannelError> {
        loop {
            match decode_message(&self.read_buf) {
                Ok((msg, consumed)) => {
                    self.read_buf.advance(consumed);
                    return Ok(msg);
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Partial message: read more bytes
                    let n = self.transport.read_buf(&mut self.read_buf).await?;
                    if n == 0 {
                        return Err(ChannelError::ConnectionClosed);
                    }
                }
                Err(e) => return Err(ChannelError::Protocol(e.to_string())),
            }
        }
    }
}

/// Negotiate TLS via the SSLRequest preamble, before any session message.
///
/// Sends the 8-byte SSLRequest and reads the single-byte response: `S`
/// upgrades the transport. `N` is an error: a TLS endpoint that refuses
/// TLS is misconfigured, not optional.
async fn negotiate_tls(
    mut transport: Transport,
    tls: &TlsConfig,
    hostname: &str,
) -> Result<Transport, ChannelError> {
    let buf = encode_message(&FrontendMessage::SslRequest);
    transport.write_all(&buf).await?;
    transport.flush().await?;

    let mut response = BytesMut::with_capacity(1);
    let n = transport.read_buf(&mut response).await?;
    if n == 0 {
        return Err(ChannelError::ConnectionClosed);
    }

    match response[0] {
        b'S' => {
            tracing::debug!("server accepted TLS, upgrading transport");
            transport.upgrade_to_tls(tls, hostname).await
        }
        b'N' => Err(ChannelError::Tls(
            "server does not support TLS on this endpoint".into(),
        )),
        other => Err(ChannelError::Protocol(format!(
            "unexpected SSLRequest response byte: 0x{:02X}",
            other
        ))),
    }
}

/// The live, verified session shared with the application layer.
///
/// Cheap to share behind `Arc`; a handle that reports a fatal disconnect is
/// rebuilt only through an explicit re-bootstrap, never healed in place.
pub struct ConnectionHandle {
    inner: tokio::sync::Mutex<Option<Connection>>,
    server_version: Option<String>,
    process_id: Option<i32>,
}

impl ConnectionHandle {
    fn new(conn: Connection) -> Self {
        let server_version = conn.server_parameter("server_version").map(str::to_string);
        let process_id = conn.backend_pid();
        Self {
            inner: tokio::sync::Mutex::new(Some(conn)),
            server_version,
            process_id,
        }
    }

    /// Server version reported at startup
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    /// Backend process ID of the session
    pub fn backend_pid(&self) -> Option<i32> {
        self.process_id
    }

    /// Re-run the verification query on the live session.
    ///
    /// An error here is the application's cue to request an explicit
    /// re-bootstrap.
    pub async fn ping(&self) -> Result<(), ChannelError> {
        let mut guard = self.inner.lock().await;
        match guard.as_mut() {
            Some(conn) => conn.verify().await,
            None => Err(ChannelError::ConnectionClosed),
        }
    }

    /// Close the underlying session. Idempotent.
    pub async fn close(&self) -> Result<(), ChannelError> {
        let conn = self.inner.lock().await.take();
        match conn {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("server_version", &self.server_version)
            .field("process_id", &self.process_id)
            .finish()
    }
}

/// The production [`Connector`]: resolves the endpoint once, then opens,
/// authenticates and verifies a session per attempt.
pub struct ChannelConnector {
    endpoint: Endpoint,
    user: String,
    database: String,
    password: SecretString,
    credential: Arc<Credential>,
}

impl ChannelConnector {
    /// Build a connector for a validated configuration and credential.
    pub fn new(config: &ConnectionConfig, credential: Arc<Credential>) -> Self {
        if credential.project_id() != config.instance.project() {
            tracing::warn!(
                credential_project = %credential.project_id(),
                instance_project = %config.instance.project(),
                "service-account project does not match instance project"
            );
        }

        Self {
            endpoint: Endpoint::resolve(config),
            user: config.user.clone(),
            database: config.database.clone(),
            password: config.password.clone(),
            credential,
        }
    }

    /// Replace the resolved endpoint (e.g. to attach TLS to a TCP endpoint).
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// The endpoint this connector dials
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The credential backing the channel
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    async fn open_session(&self) -> Result<ConnectionHandle, ChannelError> {
        let mut transport = self.endpoint.open().await?;

        if let (Some(tls), Some(hostname)) = (self.endpoint.tls(), self.endpoint.hostname()) {
            transport = negotiate_tls(transport, tls, hostname).await?;
        }

        let mut conn = Connection::new(transport);
        conn.startup(&self.user, &self.database, &self.password)
            .await?;
        conn.verify().await?;

        Ok(ConnectionHandle::new(conn))
    }
}

#[async_trait::async_trait]
impl Connector for ChannelConnector {
    type Handle = ConnectionHandle;

    async fn connect(&self) -> Result<ConnectionHandle, ConnectError> {
        let result = self
            .open_session()
            .instrument(tracing::info_span!("connect", endpoint = %self.endpoint))
            .await;

        result.map_err(|e| {
            let message = e.to_string();
            match classify(&e) {
                FailureClass::Transient => ConnectError::transient(message),
                FailureClass::Fatal => ConnectError::fatal(message),
            }
        })
    }
}

fn utf8(data: Vec<u8>) -> Result<String, ChannelError> {
    String::from_utf8(data)
        .map_err(|e| ChannelError::Authentication(format!("invalid UTF-8 in SASL message: {}", e)))
}
