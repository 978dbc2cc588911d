//! Connection configuration

use crate::{FileshiftError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Immutable connection parameters for one session.
///
/// An empty password is treated as no password.
#[derive(Deserialize)]
#[serde(from = "RawConnectionConfig")]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    username: String,
    password: Option<SecretString>,
}

impl ConnectionConfig {
    /// Create a configuration
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: Option<&str>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.filter(|p| !p.is_empty()).map(SecretString::from),
        }
    }

    /// Parse a configuration from JSON.
    ///
    /// `port` defaults to 22 and `password` may be omitted.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can be used to connect
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(FileshiftError::Configuration("host must not be empty".to_string()));
        }
        if self.username.is_empty() {
            return Err(FileshiftError::Configuration("username must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(FileshiftError::Configuration("port must not be 0".to_string()));
        }
        Ok(())
    }

    /// Remote hostname or IP
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Remote port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Login name
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether password authentication will be used
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub(crate) fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.expose_secret())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("10.0.0.1", DEFAULT_PORT, "admin", None)
    }
}

impl Clone for ConnectionConfig {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self
                .password
                .as_ref()
                .map(|p| SecretString::from(p.expose_secret().to_owned())),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Deserialize)]
struct RawConnectionConfig {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    username: String,
    #[serde(default)]
    password: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl From<RawConnectionConfig> for ConnectionConfig {
    fn from(raw: RawConnectionConfig) -> Self {
        Self::new(raw.host, raw.port, raw.username, raw.password.as_deref())
    }
}
