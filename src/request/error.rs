//! Error types delivered to request callers.
//!
//! Every asynchronous failure reaches the caller through the completion
//! handler as a [`RequestError`]. Only [`RequestError::Configuration`] is ever
//! returned synchronously, from `start`.

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

/// Error code used when no variant-specific code is configured.
pub const DEFAULT_ERROR_CODE: i64 = 31337;

/// Failure of a single request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The transport failed and the default mapper wrapped it unchanged.
    #[error("[{code}] {message}")]
    Transport {
        /// Variant error code.
        code: i64,
        /// Message of the original transport error.
        message: String,
        /// The original transport error.
        #[source]
        source: TransportError,
    },

    /// A transport failure remapped to a domain-specific error by a variant.
    #[error("[{code}] {message}")]
    Domain {
        /// Domain error code.
        code: i64,
        /// Domain error message.
        message: String,
    },

    /// The request was cancelled before it finished.
    #[error("request {url} was cancelled")]
    Cancelled {
        /// Target URL of the cancelled request.
        url: String,
    },

    /// The response body could not be turned into the expected result.
    #[error("[{code}] failed to parse response from {url}: {source}")]
    Parse {
        /// Variant error code.
        code: i64,
        /// Target URL.
        url: String,
        /// What went wrong.
        #[source]
        source: ParseError,
    },

    /// Writing the downloaded body to disk failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The request could not be started (invalid descriptor, started twice,
    /// no async runtime). Reported synchronously before any network I/O.
    #[error("invalid request configuration: {message}")]
    Configuration {
        /// What is wrong.
        message: String,
    },
}

impl RequestError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Creates a domain error with a custom code.
    pub fn domain(code: i64, message: impl Into<String>) -> Self {
        Self::Domain {
            code,
            message: message.into(),
        }
    }

    /// Wraps a transport error with `code`, keeping its message.
    #[must_use]
    pub fn transport(code: i64, source: TransportError) -> Self {
        Self::Transport {
            code,
            message: source.to_string(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse(code: i64, url: impl Into<String>, source: ParseError) -> Self {
        Self::Parse {
            code,
            url: url.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Numeric code for display and error reporting.
    ///
    /// Cancellation, configuration and IO errors carry no variant code and
    /// report [`DEFAULT_ERROR_CODE`].
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            Self::Transport { code, .. } | Self::Domain { code, .. } | Self::Parse { code, .. } => {
                *code
            }
            Self::Cancelled { .. } | Self::Io { .. } | Self::Configuration { .. } => {
                DEFAULT_ERROR_CODE
            }
        }
    }

    /// Returns true for [`RequestError::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns the underlying transport error, if this wraps one.
    #[must_use]
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failure of a [`ResultTransform`](super::ResultTransform).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ParseError {
    /// Creates a parse error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a parse error wrapping an underlying error.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Human readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_source(format!("malformed JSON: {error}"), error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_wrap_keeps_message_and_code() {
        let error = RequestError::transport(
            DEFAULT_ERROR_CODE,
            TransportError::timeout("https://api.example.com/slow"),
        );
        let msg = error.to_string();
        assert!(msg.starts_with("[31337]"), "Expected code prefix in: {msg}");
        assert!(msg.contains("timeout"), "Expected original message in: {msg}");
        assert_eq!(error.code(), DEFAULT_ERROR_CODE);
        assert!(error.transport_error().is_some_and(TransportError::is_timeout));
    }

    #[test]
    fn test_domain_error_uses_custom_code() {
        let error = RequestError::domain(4040, "profile not found");
        assert_eq!(error.code(), 4040);
        assert_eq!(error.to_string(), "[4040] profile not found");
        assert!(error.transport_error().is_none());
    }

    #[test]
    fn test_cancelled_error_display() {
        let error = RequestError::cancelled("https://api.example.com/feed");
        assert!(error.is_cancelled());
        assert!(error.to_string().contains("cancelled"));
        assert_eq!(error.code(), DEFAULT_ERROR_CODE);
    }

    #[test]
    fn test_parse_error_display_includes_url() {
        let error = RequestError::parse(7, "https://api.example.com/x", ParseError::new("empty body"));
        let msg = error.to_string();
        assert!(msg.contains("https://api.example.com/x"), "Expected URL in: {msg}");
        assert!(msg.contains("empty body"), "Expected reason in: {msg}");
        assert_eq!(error.code(), 7);
    }

    #[test]
    fn test_parse_error_from_serde_json() {
        let json_error = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        let parse_error = ParseError::from(json_error);
        assert!(parse_error.message().contains("malformed JSON"));
        assert!(std::error::Error::source(&parse_error).is_some());
    }
}
