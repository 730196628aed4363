//! Transport configuration: timeouts, User-Agent and compression.
//!
//! Values resolve in this order: explicit settings (CLI flags, config file)
//! over environment overrides over built-in defaults.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::request::RequestError;
use crate::transport::constants::{CONNECT_TIMEOUT_SECS, MAX_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::user_agent;

/// Environment variable overriding [`TransportConfig::connect_timeout_secs`].
pub const ENV_CONNECT_TIMEOUT: &str = "CONNECTION_REQUEST_CONNECT_TIMEOUT_SECS";
/// Environment variable overriding [`TransportConfig::read_timeout_secs`].
pub const ENV_READ_TIMEOUT: &str = "CONNECTION_REQUEST_READ_TIMEOUT_SECS";
/// Environment variable overriding [`TransportConfig::user_agent`].
pub const ENV_USER_AGENT: &str = "CONNECTION_REQUEST_USER_AGENT";

/// Settings used to build the default reqwest-backed transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// TCP/TLS connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-exchange timeout in seconds.
    pub read_timeout_secs: u64,
    /// User-Agent header; `None` uses the crate default.
    pub user_agent: Option<String>,
    /// Transparent gzip decompression.
    pub gzip: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            user_agent: None,
            gzip: true,
        }
    }
}

impl TransportConfig {
    /// Validates timeout ranges.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Configuration`] when a timeout is zero or
    /// exceeds one hour.
    pub fn validate(&self) -> Result<(), RequestError> {
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }

    /// Applies `CONNECTION_REQUEST_*` environment overrides on top of `self`.
    ///
    /// Unparseable or empty values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(secs) = env_u64(ENV_CONNECT_TIMEOUT) {
            self.connect_timeout_secs = secs;
        }
        if let Some(secs) = env_u64(ENV_READ_TIMEOUT) {
            self.read_timeout_secs = secs;
        }
        if let Some(agent) = env_string(ENV_USER_AGENT) {
            self.user_agent = Some(agent);
        }
        debug!(config = ?self, "resolved transport config");
        self
    }

    /// The User-Agent to send, falling back to the crate default.
    #[must_use]
    pub fn effective_user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(user_agent::default_user_agent)
    }
}

fn validate_timeout_secs(name: &str, value: u64) -> Result<(), RequestError> {
    if value == 0 || value > MAX_TIMEOUT_SECS {
        return Err(RequestError::configuration(format!(
            "invalid `{name}`: {value}. Expected range: 1..={MAX_TIMEOUT_SECS}"
        )));
    }
    Ok(())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(name: &str) -> Option<u64> {
    env_string(name).and_then(|value| value.parse().ok())
}
