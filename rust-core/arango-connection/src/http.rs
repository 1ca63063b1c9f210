// SPDX-License-Identifier: PMPL-1.0-or-later
//! reqwest-backed [`Connection`].
//!
//! Owns a pooled `reqwest::Client`, the [`EndpointList`] and the
//! authentication settings. Redirects are never followed here: a 307 from a
//! follower agent is information the agency client must act on itself.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, instrument};

use crate::config::{Auth, ConnectionConfig};
use crate::connection::Connection;
use crate::endpoint::EndpointList;
use crate::error::{ConnectionError, Result};
use crate::request::{Request, Response};

/// HTTP connection to a set of cluster endpoints.
///
/// # Examples
///
/// ```rust,no_run
/// use arango_connection::{Connection, ConnectionConfig, HttpConnection, Request};
///
/// # tokio_test::block_on(async {
/// let conn = HttpConnection::new(ConnectionConfig::with_endpoints(["http://localhost:8531"]))?;
/// let resp = conn.execute(Request::get("/_api/version")).await?;
/// assert_eq!(resp.status, 200);
/// # Ok::<(), arango_connection::ConnectionError>(())
/// # }).unwrap();
/// ```
#[derive(Debug)]
pub struct HttpConnection {
    http: reqwest::Client,
    endpoints: EndpointList,
    auth: Auth,
    name: String,
}

impl HttpConnection {
    /// Build a connection from `config`.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint list is empty or invalid, or if the HTTP client
    /// cannot be constructed (TLS backend initialisation).
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let endpoints = EndpointList::new(&config.endpoints)?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(ConnectionError::Network)?;
        let name = endpoints.snapshot().join(",");

        Ok(Self {
            http,
            endpoints,
            auth: config.auth,
            name,
        })
    }

    /// Attach authentication headers to an outgoing request builder.
    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Auth::None => builder,
            Auth::Jwt(token) => builder.header(AUTHORIZATION, format!("bearer {token}")),
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
        }
    }
}

#[async_trait]
impl Connection for HttpConnection {
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn execute(&self, request: Request) -> Result<Response> {
        let endpoint = self.endpoints.next();
        let url = format!("{endpoint}{}", request.path);

        let mut builder = self.apply_auth(self.http.request(request.method.clone(), &url));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ConnectionError::Timeout {
                    endpoint: endpoint.clone(),
                }
            } else if e.is_connect() {
                ConnectionError::Unreachable {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                }
            } else {
                ConnectionError::Network(e)
            }
        })?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(ConnectionError::Network)?.to_vec();

        debug!(%endpoint, status, bytes = body.len(), "request completed");

        Ok(Response {
            status,
            headers,
            body,
            endpoint,
        })
    }

    fn endpoints(&self) -> Vec<String> {
        self.endpoints.snapshot().as_ref().clone()
    }

    fn set_endpoints(&self, endpoints: Vec<String>) -> Result<()> {
        self.endpoints.replace(&endpoints)?;
        debug!(connection = %self.name, endpoints = ?endpoints, "endpoint list replaced");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_endpoints() {
        let conn = HttpConnection::new(ConnectionConfig::with_endpoints([
            "tcp://agent-1:8531",
            "ssl://agent-2:8531/",
        ]))
        .unwrap();
        assert_eq!(
            conn.endpoints(),
            vec![
                "http://agent-1:8531".to_string(),
                "https://agent-2:8531".to_string()
            ]
        );
        assert_eq!(conn.name(), "http://agent-1:8531,https://agent-2:8531");
    }

    #[test]
    fn test_new_rejects_empty_endpoints() {
        let config = ConnectionConfig {
            endpoints: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(
            HttpConnection::new(config),
            Err(ConnectionError::NoEndpoints)
        ));
    }

    #[test]
    fn test_set_endpoints_replaces_list() {
        let conn =
            HttpConnection::new(ConnectionConfig::with_endpoints(["http://agent-1:8531"])).unwrap();
        conn.set_endpoints(vec!["http://leader:8531/".to_string()])
            .unwrap();
        assert_eq!(conn.endpoints(), vec!["http://leader:8531".to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_transport_error() {
        // Port 9 (discard) on localhost is not expected to run an HTTP server.
        let config = ConnectionConfig {
            endpoints: vec!["http://127.0.0.1:9".to_string()],
            request_timeout: std::time::Duration::from_secs(2),
            ..Default::default()
        };
        let conn = HttpConnection::new(config).unwrap();
        let result = conn.execute(Request::get("/_api/version")).await;
        assert!(matches!(
            result,
            Err(ConnectionError::Unreachable { .. })
                | Err(ConnectionError::Network(_))
                | Err(ConnectionError::Timeout { .. })
        ));
    }
}
