//! Error types for the transport layer.
//!
//! These describe failures of the underlying HTTP exchange itself (connection,
//! timeout, status). They reach callers only after passing through the
//! request's [`ErrorMapper`](crate::request::ErrorMapper).

use thiserror::Error;

/// Errors reported by a [`Transport`](super::Transport) for a single exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Transport-specific failure without a richer error type behind it.
    #[error("connection failed for {url}: {message}")]
    Connection {
        /// The URL being requested.
        url: String,
        /// Human readable reason.
        message: String,
    },

    /// The HTTP client could not be constructed from its configuration.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    /// Classifies a reqwest error, promoting timeouts to [`TransportError::Timeout`].
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a generic connection error.
    pub fn connection(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Returns the HTTP status code for status errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the exchange failed because it ran out of time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_timeout_display() {
        let error = TransportError::timeout("https://api.example.com/users");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://api.example.com/users"));
        assert!(error.is_timeout());
    }

    #[test]
    fn test_transport_error_http_status_display() {
        let error = TransportError::http_status("https://api.example.com/users/7", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(
            msg.contains("https://api.example.com/users/7"),
            "Expected URL in: {msg}"
        );
        assert_eq!(error.status(), Some(404));
    }

    #[test]
    fn test_transport_error_connection_display() {
        let error = TransportError::connection("https://api.example.com", "connection refused");
        let msg = error.to_string();
        assert!(msg.contains("connection refused"), "Expected reason in: {msg}");
        assert_eq!(error.status(), None);
        assert!(!error.is_timeout());
    }
}
