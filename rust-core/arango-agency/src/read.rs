// SPDX-License-Identifier: PMPL-1.0-or-later
//! Agency read path.
//!
//! A read posts `[[<full key>]]` to the read endpoint and walks the returned
//! tree down the requested path. Followers answer with a 307 pointing at the
//! leader; the client then replaces its connection's endpoint set with that
//! single leader and retries, up to [`AgencyConfig::max_redirects`] hops.
//!
//! [`AgencyConfig::max_redirects`]: crate::config::AgencyConfig::max_redirects

use std::collections::HashSet;

use arango_connection::{endpoint_origin, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::client::{Agency, READ_PATH};
use crate::error::{AgencyError, Result};
use crate::key::Key;

impl Agency {
    /// Read the value at `key` and deserialize it.
    ///
    /// # Errors
    ///
    /// - [`AgencyError::KeyNotFound`] if `key` or one of its ancestors is
    ///   absent; the error carries the prefix at which resolution stopped.
    /// - Redirect-class errors ([`AgencyError::RedirectWithoutLocation`],
    ///   [`AgencyError::BadRedirect`], [`AgencyError::TooManyRedirects`],
    ///   [`AgencyError::RedirectCycle`]).
    /// - [`AgencyError::UnexpectedStatus`] for any status other than
    ///   200/201/202/307.
    /// - Transport errors, unchanged.
    pub async fn read_key<T: DeserializeOwned>(&self, key: impl Into<Key>) -> Result<T> {
        let value = self.read_value(key).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Read the raw JSON value at `key`.
    pub async fn read_value(&self, key: impl Into<Key>) -> Result<Value> {
        let key = key.into();
        let root = self.read_tree(&key).await?;
        resolve(root, &key)
    }

    /// Fetch the tree containing `key`, following leader redirects.
    #[instrument(skip(self, key), fields(key = %key))]
    async fn read_tree(&self, key: &Key) -> Result<Value> {
        let body = json!([[key.full_key()]]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut hops = 0usize;

        loop {
            let response = self.post(READ_PATH, &body).await?;
            visited.insert(
                endpoint_origin(&response.endpoint).unwrap_or_else(|_| response.endpoint.clone()),
            );

            match response.status {
                200..=202 => return first_tree(&response),
                307 => {
                    let leader = redirect_target(&response)?;
                    if visited.contains(&leader) {
                        return Err(AgencyError::RedirectCycle { endpoint: leader });
                    }
                    if hops >= self.config().max_redirects {
                        return Err(AgencyError::TooManyRedirects { hops });
                    }
                    hops += 1;
                    debug!(from = %response.endpoint, to = %leader, hops, "following agency leader redirect");
                    self.connection().set_endpoints(vec![leader])?;
                }
                status => {
                    return Err(AgencyError::UnexpectedStatus {
                        status,
                        endpoint: response.endpoint.clone(),
                        body: response.text(),
                    })
                }
            }
        }
    }
}

/// Leader endpoint named by a 307 response.
fn redirect_target(response: &Response) -> Result<String> {
    let location = response
        .header("location")
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| AgencyError::RedirectWithoutLocation {
            endpoint: response.endpoint.clone(),
        })?;
    endpoint_origin(location).map_err(|e| AgencyError::BadRedirect {
        endpoint: response.endpoint.clone(),
        location: location.to_string(),
        reason: e.to_string(),
    })
}

/// Element 0 of the read response array.
fn first_tree(response: &Response) -> Result<Value> {
    let body: Value = response.json()?;
    match body {
        Value::Array(mut trees) if !trees.is_empty() => Ok(trees.swap_remove(0)),
        other => Err(AgencyError::Protocol(format!(
            "read response from {} is not a non-empty array: {other}",
            response.endpoint
        ))),
    }
}

/// Walk `key` down `root`.
///
/// Each step must land on an object that contains the next segment. On
/// failure the returned [`AgencyError::KeyNotFound`] names the prefix up to
/// and including the segment that could not be resolved.
pub(crate) fn resolve(root: Value, key: &Key) -> Result<Value> {
    let mut current = root;
    for (depth, segment) in key.segments().iter().enumerate() {
        let not_found = || AgencyError::KeyNotFound {
            key: key.prefix(depth + 1),
        };
        current = match current {
            Value::Object(mut map) => map.remove(segment).ok_or_else(not_found)?,
            _ => return Err(not_found()),
        };
    }
    Ok(current)
}
