// SPDX-License-Identifier: PMPL-1.0-or-later
//! Connection configuration and authentication.

use std::time::Duration;

use tracing::warn;

use crate::endpoint::normalize_endpoint;
use crate::error::{ConnectionError, Result};

/// Authentication method for talking to cluster members.
#[derive(Debug, Clone, Default)]
pub enum Auth {
    /// No authentication (local development, trusted networks).
    #[default]
    None,
    /// JWT passed via `Authorization: bearer <token>`.
    Jwt(String),
    /// HTTP Basic authentication.
    Basic {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
}

/// Settings for an [`HttpConnection`](crate::http::HttpConnection).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Initial endpoint list.
    pub endpoints: Vec<String>,
    /// Authentication applied to every request.
    pub auth: Auth,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://localhost:8531".to_string()],
            auth: Auth::None,
            request_timeout: Duration::from_secs(30),
            user_agent: format!("arango-connection/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ConnectionConfig {
    /// Config for the given endpoints with default settings otherwise.
    pub fn with_endpoints<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Load settings from the environment.
    ///
    /// - `AGENCY_ENDPOINTS`: comma-separated endpoint list. Unparsable
    ///   entries are skipped with a warning.
    /// - `AGENCY_JWT`, or `AGENCY_USERNAME` + `AGENCY_PASSWORD`.
    /// - `AGENCY_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("AGENCY_ENDPOINTS").filter(|v| !v.trim().is_empty()) {
            let endpoints: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .filter_map(|e| match normalize_endpoint(e) {
                    Ok(normalized) => Some(normalized),
                    Err(err) => {
                        warn!(entry = %e, error = %err, "Skipping invalid agency endpoint");
                        None
                    }
                })
                .collect();
            if endpoints.is_empty() {
                return Err(ConnectionError::NoEndpoints);
            }
            config.endpoints = endpoints;
        }

        if let Some(token) = lookup("AGENCY_JWT").filter(|v| !v.is_empty()) {
            config.auth = Auth::Jwt(token);
        } else if let Some(username) = lookup("AGENCY_USERNAME").filter(|v| !v.is_empty()) {
            config.auth = Auth::Basic {
                username,
                password: lookup("AGENCY_PASSWORD").unwrap_or_default(),
            };
        }

        if let Some(raw) = lookup("AGENCY_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ConnectionError::Config(format!(
                    "AGENCY_REQUEST_TIMEOUT_SECS must be a whole number of seconds, got '{raw}'"
                ))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}
