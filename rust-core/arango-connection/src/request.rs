// SPDX-License-Identifier: PMPL-1.0-or-later
//! Transport-neutral request and response types.
//!
//! Bodies are carried as `serde_json::Value` on the way out so that
//! in-process connections can inspect them without re-parsing, and as raw
//! bytes on the way back.

use std::collections::HashMap;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ConnectionError, Result};

/// An outgoing request, relative to whichever endpoint the connection picks.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute path, e.g. `/_api/agency/read`.
    pub path: String,
    /// Optional JSON body.
    pub body: Option<serde_json::Value>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Build a request with no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    /// Shorthand for a `GET`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Shorthand for a `POST`.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Serialization`] if `body` cannot be
    /// represented as JSON (e.g. a map with non-string keys).
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Add a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A received response.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, keyed by lower-case name.
    pub headers: HashMap<String, String>,
    /// Raw body.
    pub body: Vec<u8>,
    /// Endpoint that produced this response.
    pub endpoint: String,
}

impl Response {
    /// Build a response with an empty body.
    pub fn new(status: u16, endpoint: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Builder-style JSON body setter, mostly used by in-process connections.
    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = serde_json::to_vec(body)?;
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        Ok(self)
    }

    /// Builder-style header setter.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Look up a header, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Deserialize the body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(ConnectionError::Serialization)
    }

    /// Body as text, for diagnostics.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
