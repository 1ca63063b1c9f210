// SPDX-License-Identifier: PMPL-1.0-or-later
//! Agency write path.
//!
//! A write submits a one-transaction batch to the persistent or transient
//! write endpoint. The outcome is decided by the `results` array in the
//! response body, not by the HTTP status: `[0]` or `[]` means a precondition
//! failed, any other single entry is the log index the transaction was
//! committed at, and anything longer is a protocol violation.
//!
//! Writes never follow redirects. Callers that may be talking to a follower
//! should read first, which moves the connection to the leader.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::client::{Agency, TRANSIENT_PATH, WRITE_PATH};
use crate::error::{AgencyError, Result};
use crate::key::Key;
use crate::transaction::{Condition, KeyChanger, Transaction};

/// Status codes that carry a `results` body.
const WRITE_ACCEPTED: &[u16] = &[200, 201, 202, 412];

#[derive(Debug, Deserialize)]
struct WriteResult {
    #[serde(default)]
    results: Vec<u64>,
}

/// Map a `results` array to an outcome.
pub(crate) fn interpret_results(results: &[u64]) -> Result<u64> {
    match results {
        [] | [0] => Err(AgencyError::PreconditionFailed),
        [index] => Ok(*index),
        more => Err(AgencyError::Protocol(format!(
            "expected exactly 1 write result, got {}",
            more.len()
        ))),
    }
}

impl Agency {
    /// Submit `tx` atomically.
    ///
    /// Returns the log index the transaction was committed at.
    ///
    /// # Errors
    ///
    /// - [`AgencyError::PreconditionFailed`] if any condition did not hold.
    /// - [`AgencyError::Protocol`] if the result array does not have exactly
    ///   one entry.
    /// - [`AgencyError::UnexpectedStatus`] for statuses other than
    ///   200/201/202/412.
    /// - Transport errors, unchanged.
    #[instrument(skip(self, tx), fields(transient = tx.is_transient(), keys = tx.keys().len()))]
    pub async fn write_transaction(&self, tx: &Transaction) -> Result<u64> {
        let path = if tx.is_transient() {
            TRANSIENT_PATH
        } else {
            WRITE_PATH
        };

        let outcome = self.submit(path, tx).await;
        match &outcome {
            Ok(index) => debug!(index, "agency transaction committed"),
            Err(e) if e.is_precondition_failed() => debug!("agency precondition failed"),
            Err(e) if e.is_cancellation() => debug!(error = %e, "agency write cancelled"),
            Err(e) => error!(error = %e, "agency write failed"),
        }
        outcome
    }

    async fn submit(&self, path: &str, tx: &Transaction) -> Result<u64> {
        let response = self.post(path, &tx.to_wire()).await?;
        if !WRITE_ACCEPTED.contains(&response.status) {
            return Err(AgencyError::UnexpectedStatus {
                status: response.status,
                endpoint: response.endpoint.clone(),
                body: response.text(),
            });
        }
        let result: WriteResult = response.json()?;
        interpret_results(&result.results)
    }

    /// Unconditionally set `key` to `value`, optionally expiring after `ttl`.
    pub async fn write_key<V: Serialize + ?Sized>(
        &self,
        key: impl Into<Key>,
        value: &V,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let tx = Transaction::default().with_key(set_changer(key.into(), value, ttl)?);
        self.write_transaction(&tx).await.map(drop)
    }

    /// Set `key` to `value` only if `key` does not exist yet.
    pub async fn write_key_if_empty<V: Serialize + ?Sized>(
        &self,
        key: impl Into<Key>,
        value: &V,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let key = key.into();
        let tx = Transaction::default()
            .with_key(set_changer(key.clone(), value, ttl)?)
            .with_condition(key, Condition::old_empty(true));
        self.write_transaction(&tx).await.map(drop)
    }

    /// Set `key` to `new_value` only if its current value equals `old_value`.
    pub async fn write_key_if_equal_to<V, O>(
        &self,
        key: impl Into<Key>,
        new_value: &V,
        old_value: &O,
        ttl: Option<Duration>,
    ) -> Result<()>
    where
        V: Serialize + ?Sized,
        O: Serialize + ?Sized,
    {
        let key = key.into();
        let tx = Transaction::default()
            .with_key(set_changer(key.clone(), new_value, ttl)?)
            .with_condition(key, Condition::if_equal(serde_json::to_value(old_value)?));
        self.write_transaction(&tx).await.map(drop)
    }

    /// Unconditionally delete `key`.
    pub async fn remove_key(&self, key: impl Into<Key>) -> Result<()> {
        let tx = Transaction::default().with_key(KeyChanger::delete(key));
        self.write_transaction(&tx).await.map(drop)
    }

    /// Delete `key` only if its current value equals `old_value`.
    pub async fn remove_key_if_equal_to<O: Serialize + ?Sized>(
        &self,
        key: impl Into<Key>,
        old_value: &O,
    ) -> Result<()> {
        let key = key.into();
        let tx = Transaction::default()
            .with_key(KeyChanger::delete(key.clone()))
            .with_condition(key, Condition::if_equal(serde_json::to_value(old_value)?));
        self.write_transaction(&tx).await.map(drop)
    }

    /// Ask the agency to POST to `callback_url` whenever `key` changes.
    pub async fn register_change_callback(
        &self,
        key: impl Into<Key>,
        callback_url: &str,
    ) -> Result<()> {
        let tx = Transaction::default().with_key(KeyChanger::observe(key, callback_url));
        self.write_transaction(&tx).await.map(drop)
    }

    /// Remove a callback registered with
    /// [`register_change_callback`](Self::register_change_callback).
    pub async fn unregister_change_callback(
        &self,
        key: impl Into<Key>,
        callback_url: &str,
    ) -> Result<()> {
        let tx = Transaction::default().with_key(KeyChanger::unobserve(key, callback_url));
        self.write_transaction(&tx).await.map(drop)
    }
}

fn set_changer<V: Serialize + ?Sized>(
    key: Key,
    value: &V,
    ttl: Option<Duration>,
) -> Result<KeyChanger> {
    let value: Value = serde_json::to_value(value)?;
    Ok(match ttl {
        Some(ttl) => KeyChanger::set_with_ttl(key, value, ttl),
        None => KeyChanger::set(key, value),
    })
}
