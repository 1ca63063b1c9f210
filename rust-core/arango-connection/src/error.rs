// SPDX-License-Identifier: PMPL-1.0-or-later
//! Error types for the cluster transport.
//!
//! All fallible operations in this crate return [`Result<T>`], an alias for
//! `std::result::Result<T, ConnectionError>`.

use thiserror::Error;

/// Transport-level failures.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// An underlying HTTP / network error from `reqwest`.
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("Request to {endpoint} timed out")]
    Timeout {
        /// Endpoint the request was sent to.
        endpoint: String,
    },

    /// The endpoint could not be reached (refused, reset, not running).
    #[error("Endpoint {endpoint} unreachable: {reason}")]
    Unreachable {
        /// Endpoint the request was sent to.
        endpoint: String,
        /// Description of the failure.
        reason: String,
    },

    /// An endpoint string could not be parsed as a URL.
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The offending endpoint string.
        endpoint: String,
        /// Parser message.
        reason: String,
    },

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An endpoint list was empty.
    #[error("No endpoints configured")]
    NoEndpoints,

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConnectionError {
    /// True for failures caused by a deadline or cancellation rather than by
    /// the remote side. These are expected during shutdown.
    pub fn is_timeout(&self) -> bool {
        match self {
            ConnectionError::Timeout { .. } => true,
            ConnectionError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ConnectionError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ConnectionError {
    fn from(err: reqwest::Error) -> Self {
        ConnectionError::Network(err)
    }
}

/// Crate-level result alias using [`ConnectionError`].
pub type Result<T> = std::result::Result<T, ConnectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_for_http_failures() {
        let err = ConnectionError::Unreachable {
            endpoint: "http://agent-1:8531".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(err.status(), None);
        assert_eq!(ConnectionError::NoEndpoints.status(), None);
        assert_eq!(
            err.to_string(),
            "Endpoint http://agent-1:8531 unreachable: connection refused"
        );
    }

    #[test]
    fn test_timeout_classification() {
        let err = ConnectionError::Timeout {
            endpoint: "http://agent-1:8531".to_string(),
        };
        assert!(err.is_timeout());
        assert!(!ConnectionError::NoEndpoints.is_timeout());
    }

    #[test]
    fn test_invalid_endpoint_display() {
        let err = ConnectionError::InvalidEndpoint {
            endpoint: "::nope".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert!(err.to_string().contains("::nope"));
    }
}
