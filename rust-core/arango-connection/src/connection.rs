// SPDX-License-Identifier: PMPL-1.0-or-later
//! The `Connection` trait every transport implements.

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{Request, Response};

/// A connection to a set of cluster endpoints.
///
/// Implementations pick the endpoint for each request themselves (the HTTP
/// implementation uses round-robin) and must allow the whole endpoint set to
/// be swapped while requests are in flight. Safe to share across tokio tasks.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Send `request` to the currently selected endpoint.
    ///
    /// Any HTTP status is a successful transport outcome; interpreting it is
    /// the caller's job. Redirects are returned as-is, never followed.
    async fn execute(&self, request: Request) -> Result<Response>;

    /// Snapshot of the current endpoint list, in order.
    fn endpoints(&self) -> Vec<String>;

    /// Atomically replace the endpoint list.
    ///
    /// An empty or unparsable list is rejected and the old list is kept.
    fn set_endpoints(&self, endpoints: Vec<String>) -> Result<()>;

    /// A human-readable name for this connection, used in logging.
    fn name(&self) -> &str;
}
