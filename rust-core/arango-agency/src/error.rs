// SPDX-License-Identifier: PMPL-1.0-or-later
//! Error types for the agency client.
//!
//! All fallible operations return [`Result<T>`], an alias for
//! `std::result::Result<T, AgencyError>`. Variants fall into five groups:
//! missing keys, failed preconditions, protocol violations, transport
//! failures passed through from [`arango_connection`], and health verdicts.

use arango_connection::ConnectionError;
use thiserror::Error;

use crate::key::Key;

/// Errors produced by agency reads, writes and health checks.
#[derive(Error, Debug)]
pub enum AgencyError {
    /// Resolution stopped at `key`: the last segment is absent, or its
    /// parent is not an object. `key` is the prefix consumed so far, not
    /// necessarily the full requested path.
    #[error("Key '{key}' not found")]
    KeyNotFound {
        /// Path prefix at which resolution failed.
        key: Key,
    },

    /// A transaction precondition did not hold; nothing was written.
    #[error("Precondition failed")]
    PreconditionFailed,

    /// The server answered in a shape this client does not understand.
    #[error("Agency protocol error: {0}")]
    Protocol(String),

    /// The server answered with a status code outside the accepted set.
    #[error("Unexpected status {status} from {endpoint}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Endpoint that answered.
        endpoint: String,
        /// Response body, for diagnostics.
        body: String,
    },

    /// A 307 arrived without a `Location` header.
    #[error("Redirect from {endpoint} without a Location header")]
    RedirectWithoutLocation {
        /// Endpoint that sent the redirect.
        endpoint: String,
    },

    /// A 307 whose `Location` header does not name a usable endpoint.
    #[error("Redirect from {endpoint} to unusable location '{location}': {reason}")]
    BadRedirect {
        /// Endpoint that sent the redirect.
        endpoint: String,
        /// The `Location` header as received.
        location: String,
        /// Why it could not be used.
        reason: String,
    },

    /// The redirect chain exceeded the configured hop limit.
    #[error("Gave up after {hops} leader redirects")]
    TooManyRedirects {
        /// Number of redirects followed.
        hops: usize,
    },

    /// A redirect pointed back at an endpoint already visited.
    #[error("Redirect cycle detected at {endpoint}")]
    RedirectCycle {
        /// The endpoint seen twice.
        endpoint: String,
    },

    /// A health probe got no usable answer from an agent.
    #[error("Agent {endpoint} is not responding: {reason}")]
    AgentUnresponsive {
        /// Endpoint(s) of the agent.
        endpoint: String,
        /// What went wrong.
        reason: String,
    },

    /// Agents disagree about who the leader is.
    #[error("Agent {endpoint} reports leader '{actual}', expected '{expected}'")]
    LeaderMismatch {
        /// Agent whose answer differs.
        endpoint: String,
        /// Leader reported by the previous agent.
        expected: String,
        /// Leader reported by this agent.
        actual: String,
    },

    /// The number of agents answering as leader is not acceptable.
    #[error("Expected exactly 1 leader, found {count}")]
    LeaderCount {
        /// Number of agents that answered as leader.
        count: usize,
    },

    /// Transport failure, passed through unchanged.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgencyError {
    /// True if a key (or one of its ancestors) does not exist.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, AgencyError::KeyNotFound { .. })
    }

    /// True if a conditional write was rejected.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, AgencyError::PreconditionFailed)
    }

    /// True for the redirect-class protocol errors (status 307).
    pub fn is_redirect(&self) -> bool {
        self.status_code() == Some(307)
    }

    /// True for timeouts and cancellations, which are expected during
    /// shutdown and are not worth an error-level log line.
    pub fn is_cancellation(&self) -> bool {
        match self {
            AgencyError::Connection(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// HTTP-equivalent status code for this error, where one applies.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AgencyError::KeyNotFound { .. } => Some(404),
            AgencyError::PreconditionFailed => Some(412),
            AgencyError::RedirectWithoutLocation { .. }
            | AgencyError::BadRedirect { .. }
            | AgencyError::TooManyRedirects { .. }
            | AgencyError::RedirectCycle { .. } => Some(307),
            AgencyError::UnexpectedStatus { status, .. } => Some(*status),
            AgencyError::Connection(e) => e.status(),
            _ => None,
        }
    }
}

/// Crate-level result alias using [`AgencyError`].
pub type Result<T> = std::result::Result<T, AgencyError>;

/// Free-function form of [`AgencyError::is_key_not_found`].
pub fn is_key_not_found(err: &AgencyError) -> bool {
    err.is_key_not_found()
}

/// Free-function form of [`AgencyError::is_precondition_failed`].
pub fn is_precondition_failed(err: &AgencyError) -> bool {
    err.is_precondition_failed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_not_found_display_uses_full_key() {
        let err = AgencyError::KeyNotFound {
            key: Key::new(["a", "c"]),
        };
        assert_eq!(err.to_string(), "Key '/a/c' not found");
        assert!(err.is_key_not_found());
        assert_eq!(err.status_code(), Some(404));
    }

    #[test]
    fn test_precondition_failed_is_412() {
        let err = AgencyError::PreconditionFailed;
        assert!(err.is_precondition_failed());
        assert!(!err.is_key_not_found());
        assert_eq!(err.status_code(), Some(412));
    }

    #[test]
    fn test_redirect_class() {
        assert!(AgencyError::RedirectWithoutLocation {
            endpoint: "http://a:1".to_string()
        }
        .is_redirect());
        assert!(AgencyError::TooManyRedirects { hops: 5 }.is_redirect());
        assert!(AgencyError::RedirectCycle {
            endpoint: "http://a:1".to_string()
        }
        .is_redirect());
        assert!(AgencyError::BadRedirect {
            endpoint: "http://a:1".to_string(),
            location: "::".to_string(),
            reason: "relative URL without a base".to_string(),
        }
        .is_redirect());
        assert!(!AgencyError::Protocol("x".to_string()).is_redirect());
    }

    #[test]
    fn test_cancellation_class() {
        let err = AgencyError::from(ConnectionError::Timeout {
            endpoint: "http://a:1".to_string(),
        });
        assert!(err.is_cancellation());
        assert!(!AgencyError::PreconditionFailed.is_cancellation());
    }

    #[test]
    fn test_health_messages_are_distinct() {
        let unresponsive = AgencyError::AgentUnresponsive {
            endpoint: "http://agent-2:8531".to_string(),
            reason: "connection refused".to_string(),
        };
        let mismatch = AgencyError::LeaderMismatch {
            endpoint: "http://agent-3:8531".to_string(),
            expected: "http://agent-1:8531".to_string(),
            actual: "http://agent-2:8531".to_string(),
        };
        let count = AgencyError::LeaderCount { count: 2 };
        assert!(unresponsive.to_string().contains("agent-2"));
        assert!(mismatch.to_string().contains("reports leader"));
        assert!(count.to_string().contains("found 2"));
        assert!(unresponsive.to_string().starts_with("Agent "));
        assert_eq!(count.to_string(), "Expected exactly 1 leader, found 2");
    }
}
