// SPDX-License-Identifier: PMPL-1.0-or-later
//! The [`Agency`] handle.
//!
//! An `Agency` owns a shared [`Connection`] to one or more agents plus its
//! [`AgencyConfig`]. Operations are defined as `impl Agency` blocks in their
//! respective modules: reads in [`crate::read`], writes in [`crate::write`].
//! Cloning is cheap and clones share the connection, so a leader redirect
//! observed by one clone is seen by all.

use std::fmt;
use std::sync::Arc;

use arango_connection::{Connection, ConnectionConfig, HttpConnection, Request, Response};
use serde_json::Value;

use crate::config::AgencyConfig;
use crate::error::Result;

/// Read endpoint.
pub const READ_PATH: &str = "/_api/agency/read";
/// Persistent (replicated log) write endpoint.
pub const WRITE_PATH: &str = "/_api/agency/write";
/// Transient (in-memory, non-replicated) write endpoint.
pub const TRANSIENT_PATH: &str = "/_api/agency/transient";

/// Client for an agency (the cluster's consensus-backed key/value store).
#[derive(Clone)]
pub struct Agency {
    conn: Arc<dyn Connection>,
    config: AgencyConfig,
}

impl Agency {
    /// Wrap an existing connection with default settings.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self::with_config(conn, AgencyConfig::default())
    }

    /// Wrap an existing connection.
    pub fn with_config(conn: Arc<dyn Connection>, config: AgencyConfig) -> Self {
        Self { conn, config }
    }

    /// Open an HTTP connection to the given agents.
    pub fn connect(connection: ConnectionConfig, config: AgencyConfig) -> Result<Self> {
        let conn = HttpConnection::new(connection)?;
        Ok(Self::with_config(Arc::new(conn), config))
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// Client settings.
    pub fn config(&self) -> &AgencyConfig {
        &self.config
    }

    /// Current endpoint list of the underlying connection.
    pub fn endpoints(&self) -> Vec<String> {
        self.conn.endpoints()
    }

    /// POST a JSON body to `path`.
    pub(crate) async fn post(&self, path: &str, body: &Value) -> Result<Response> {
        let request = Request::post(path).json(body)?;
        Ok(self.conn.execute(request).await?)
    }
}

impl fmt::Debug for Agency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agency")
            .field("connection", &self.conn.name())
            .field("config", &self.config)
            .finish()
    }
}
