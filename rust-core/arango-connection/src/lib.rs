// SPDX-License-Identifier: PMPL-1.0-or-later
//! # arango-connection
//!
//! The transport layer used by the agency client: a [`Connection`] trait,
//! transport-neutral [`Request`] / [`Response`] types, a failover-safe
//! [`EndpointList`], and the reqwest-backed [`HttpConnection`].
//!
//! ## Modules
//!
//! - [`connection`]: The `Connection` trait.
//! - [`http`]: reqwest implementation with authentication.
//! - [`endpoint`]: Endpoint normalisation and the read-copy-update endpoint list.
//! - [`request`]: Request and response types.
//! - [`config`]: Connection settings, loadable from the environment.
//! - [`error`]: Error types and the crate-level `Result` alias.

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod request;

pub use config::{Auth, ConnectionConfig};
pub use connection::Connection;
pub use endpoint::{endpoint_origin, fixup_scheme, normalize_endpoint, EndpointList};
pub use error::{ConnectionError, Result};
pub use http::HttpConnection;
pub use request::{Request, Response};

// Re-exported so callers can build requests without depending on reqwest.
pub use reqwest::Method;
