//! Connection configuration for document store backends.
//!
//! ```toml
//! host = "db.internal"
//! port = 27017
//! database = "library"
//! connect_timeout_ms = 5000
//!
//! [credentials]
//! username = "librarian"
//! password = "s3cret"
//! auth_source = "admin"
//! ```

use std::{fmt, time::Duration};

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 27017;
pub const DEFAULT_DATABASE: &str = "library";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Username/password pair used to authenticate against the store.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Database holding the user's credentials, if not the target database.
    #[serde(default)]
    pub auth_source: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("auth_source", &self.auth_source)
            .finish()
    }
}

/// Settings used to open a session with the store.
///
/// The connect timeout bounds both establishing a connection and selecting a
/// server; the service imposes no timeouts of its own.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
    pub database: String,
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            credentials: None,
            database: DEFAULT_DATABASE.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
            auth_source: None,
        });
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Connection string for the configured host, without credentials.
    pub fn dsn(&self) -> String {
        format!("mongodb://{}:{}/{}", self.host, self.port, self.database)
    }

    /// Parses and validates a TOML connection config. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys, and
    /// [`ConfigError::Invalid`] if [`validate`](Self::validate) fails.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;

        Ok(config)
    }

    /// Checks that the config can address a store.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".into()));
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError::Invalid("database must not be empty".into()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("connect_timeout_ms must be non-zero".into()));
        }
        if let Some(credentials) = &self.credentials {
            if credentials.username.is_empty() {
                return Err(ConfigError::Invalid("credentials.username must not be empty".into()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ConnectionConfig::from_toml_str("").unwrap();

        assert_eq!(config, ConnectionConfig::default());
        assert_eq!(config.dsn(), "mongodb://localhost:27017/library");
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn parses_full_config() {
        let config = ConnectionConfig::from_toml_str(
            r#"
            host = "db.internal"
            port = 27018
            database = "catalog"
            connect_timeout_ms = 2500

            [credentials]
            username = "librarian"
            password = "s3cret"
            auth_source = "admin"
            "#,
        )
        .unwrap();

        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 27018);
        assert_eq!(config.connect_timeout(), Duration::from_millis(2500));
        assert_eq!(
            config.credentials,
            Some(Credentials {
                username: "librarian".into(),
                password: "s3cret".into(),
                auth_source: Some("admin".into()),
            })
        );
    }

    #[test]
    fn rejects_unknown_keys_and_invalid_values() {
        assert!(matches!(
            ConnectionConfig::from_toml_str("hostname = \"x\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ConnectionConfig::from_toml_str("port = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ConnectionConfig::from_toml_str("database = \"\""),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn debug_output_redacts_password() {
        let config = ConnectionConfig::default().with_credentials("librarian", "s3cret");
        let rendered = format!("{config:?}");

        assert!(rendered.contains("librarian"));
        assert!(!rendered.contains("s3cret"));
    }
}
