//! Connection configuration from the process environment
//!
//! The five required values and their variable names are fixed by the
//! deployment contract:
//!
//! * `INSTANCE_CONNECTION_NAME`: `<project>:<region>:<instance>`
//! * `DB_NAME`: database to select
//! * `DB_USER`: database-layer user
//! * `DB_PASS`: database-layer password (never logged)
//! * `GOOGLE_APPLICATION_CREDENTIALS`: path to the service-account key file
//!
//! `PORT` (application listen port), `INSTANCE_UNIX_SOCKET`, `DB_HOST` and
//! `DB_PORT` are optional; the latter three steer endpoint resolution in
//! [`crate::channel::Endpoint`].

use crate::error::ConfigError;
use secrecy::SecretString;
use std::path::PathBuf;
use std::str::FromStr;

/// Default application listen port when `PORT` is unset
pub const DEFAULT_LISTEN_PORT: u16 = 8080;

/// Compound identifier of a managed database instance.
///
/// Format: `<project>:<region>:<instance>`, all three parts non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceName {
    project: String,
    region: String,
    instance: String,
}

impl InstanceName {
    /// Project part of the identifier
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Region part of the identifier
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Instance part of the identifier
    pub fn instance(&self) -> &str {
        &self.instance
    }
}

impl FromStr for InstanceName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(project), Some(region), Some(instance), None)
                if !project.is_empty() && !region.is_empty() && !instance.is_empty() =>
            {
                Ok(Self {
                    project: project.to_string(),
                    region: region.to_string(),
                    instance: instance.to_string(),
                })
            }
            _ => Err(ConfigError::InvalidFormat {
                field: "INSTANCE_CONNECTION_NAME",
                reason: format!(
                    "'{}' does not match <project>:<region>:<instance>",
                    s
                ),
            }),
        }
    }
}

impl std::fmt::Display for InstanceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.project, self.region, self.instance)
    }
}

/// Immutable connection configuration, created once at process start.
///
/// The password is held as a [`SecretString`]; its `Debug` output is redacted,
/// so logging the whole config is safe.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Instance identifier
    pub instance: InstanceName,
    /// Database name
    pub database: String,
    /// Database user
    pub user: String,
    /// Database password (redacted in Debug output)
    pub password: SecretString,
    /// Path to the service-account key file
    pub credential_path: PathBuf,
    /// Application listen port (`PORT`); not used by the bootstrap itself
    pub listen_port: u16,
    /// Explicit socket path override (`INSTANCE_UNIX_SOCKET`)
    pub unix_socket: Option<PathBuf>,
    /// TCP proxy host override (`DB_HOST`)
    pub tcp_host: Option<String>,
    /// TCP proxy port override (`DB_PORT`, default 5432 when `DB_HOST` is set)
    pub tcp_port: Option<u16>,
}

impl ConnectionConfig {
    /// Load and validate configuration from the process environment.
    ///
    /// # Errors
    ///
    /// * [`ConfigError::MissingField`] if any required variable is absent
    ///   or empty
    /// * [`ConfigError::InvalidFormat`] if `INSTANCE_CONNECTION_NAME` fails
    ///   the shape check, or a port variable is non-numeric
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    ///
    /// `from_env` delegates here; tests pass a map-backed closure so they
    /// never mutate process-global environment state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let instance: InstanceName = required(&lookup, "INSTANCE_CONNECTION_NAME")?.parse()?;
        let database = required(&lookup, "DB_NAME")?;
        let user = required(&lookup, "DB_USER")?;
        let password = SecretString::new(required(&lookup, "DB_PASS")?);
        let credential_path = PathBuf::from(required(&lookup, "GOOGLE_APPLICATION_CREDENTIALS")?);

        let listen_port = match lookup("PORT") {
            Some(raw) => parse_port("PORT", &raw)?,
            None => DEFAULT_LISTEN_PORT,
        };

        let unix_socket = lookup("INSTANCE_UNIX_SOCKET")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let tcp_host = lookup("DB_HOST").filter(|s| !s.is_empty());
        let tcp_port = match lookup("DB_PORT") {
            Some(raw) if !raw.is_empty() => Some(parse_port("DB_PORT", &raw)?),
            _ => None,
        };

        Ok(Self {
            instance,
            database,
            user,
            password,
            credential_path,
            listen_port,
            unix_socket,
            tcp_host,
            tcp_port,
        })
    }

    /// Path to the service-account key file
    pub fn credential_path(&self) -> &std::path::Path {
        &self.credential_path
    }
}

/// Read a required variable; absent and empty are equivalent (an empty value
/// is operationally indistinguishable from an unset one).
fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingField(name)),
    }
}

fn parse_port(field: &'static str, raw: &str) -> Result<u16, ConfigError> {
    raw.parse::<u16>().map_err(|_| ConfigError::InvalidFormat {
        field,
        reason: format!("'{}' is not a valid port number", raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_env() -> HashMap<String, String> {
        env(&[
            ("INSTANCE_CONNECTION_NAME", "proj:us-central1:inst"),
            ("DB_NAME", "reviews"),
            ("DB_USER", "svc"),
            ("DB_PASS", "hunter2"),
            ("GOOGLE_APPLICATION_CREDENTIALS", "/secrets/sa-key.json"),
        ])
    }

    fn load(vars: &HashMap<String, String>) -> Result<ConnectionConfig, ConfigError> {
        ConnectionConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_load_full_environment() {
        let config = load(&full_env()).unwrap();

        assert_eq!(config.instance.to_string(), "proj:us-central1:inst");
        assert_eq!(config.instance.project(), "proj");
        assert_eq!(config.instance.region(), "us-central1");
        assert_eq!(config.instance.instance(), "inst");
        assert_eq!(config.database, "reviews");
        assert_eq!(config.user, "svc");
        assert_eq!(config.password.expose_secret(), "hunter2");
        assert_eq!(
            config.credential_path,
            PathBuf::from("/secrets/sa-key.json")
        );
        assert_eq!(config.listen_port, DEFAULT_LISTEN_PORT);
        assert!(config.unix_socket.is_none());
        assert!(config.tcp_host.is_none());
    }

    #[test]
    fn test_each_missing_field_is_named() {
        for field in [
            "INSTANCE_CONNECTION_NAME",
            "DB_NAME",
            "DB_USER",
            "DB_PASS",
            "GOOGLE_APPLICATION_CREDENTIALS",
        ] {
            let mut vars = full_env();
            vars.remove(field);
            match load(&vars) {
                Err(ConfigError::MissingField(name)) => assert_eq!(name, field),
                other => panic!("expected MissingField({}), got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_empty_value_is_missing() {
        let mut vars = full_env();
        vars.insert("DB_USER".to_string(), String::new());
        assert_eq!(
            load(&vars).unwrap_err(),
            ConfigError::MissingField("DB_USER")
        );
    }

    #[test]
    fn test_instance_name_format_rejected() {
        for bad in ["bad-format", "a:b", "a:b:c:d", ":region:inst", "p::i"] {
            let mut vars = full_env();
            vars.insert("INSTANCE_CONNECTION_NAME".to_string(), bad.to_string());
            match load(&vars) {
                Err(ConfigError::InvalidFormat { field, .. }) => {
                    assert_eq!(field, "INSTANCE_CONNECTION_NAME")
                }
                other => panic!("expected InvalidFormat for '{}', got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_instance_name_format_accepted() {
        assert!("proj:us-central1:inst".parse::<InstanceName>().is_ok());
        assert!("my-project:europe-west4:db-01".parse::<InstanceName>().is_ok());
    }

    #[test]
    fn test_port_parsing() {
        let mut vars = full_env();
        vars.insert("PORT".to_string(), "9090".to_string());
        assert_eq!(load(&vars).unwrap().listen_port, 9090);

        vars.insert("PORT".to_string(), "not-a-port".to_string());
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidFormat { field: "PORT", .. })
        ));
    }

    #[test]
    fn test_tcp_override() {
        let mut vars = full_env();
        vars.insert("DB_HOST".to_string(), "127.0.0.1".to_string());
        vars.insert("DB_PORT".to_string(), "5433".to_string());

        let config = load(&vars).unwrap();
        assert_eq!(config.tcp_host.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.tcp_port, Some(5433));
    }

    #[test]
    fn test_debug_output_redacts_password() {
        let config = load(&full_env()).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
    }
}
