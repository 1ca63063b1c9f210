// SPDX-License-Identifier: PMPL-1.0-or-later
//! Compatibility layer for callers of the previous client generation.
//!
//! The older API passed conditions as a [`WriteCondition`] accumulator that
//! could hold several predicates per key, and accepted any object exposing
//! keys, conditions, client id and options as a transaction. This module
//! converts both shapes into the native [`Transaction`] at the boundary and
//! then delegates to [`Agency`]; it keeps no state of its own.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::client::Agency;
use crate::error::Result;
use crate::key::Key;
use crate::transaction::{Condition, KeyChanger, Transaction, TransactionOptions};

#[derive(Debug, Clone, Default, PartialEq)]
struct Predicates {
    old_empty: Option<bool>,
    is_array: Option<bool>,
    old: Option<Value>,
}

/// Condition accumulator in the shape the previous client generation used.
///
/// Unlike [`Transaction::add_condition`], several predicates may be attached
/// to the same key here. A native transaction holds one predicate per key, so
/// [`apply_to`](Self::apply_to) keeps only the strongest one per key:
///
/// 1. equals ([`if_equal_to`](Self::if_equal_to))
/// 2. is-array ([`if_is_array`](Self::if_is_array))
/// 3. old-empty ([`if_empty`](Self::if_empty))
///
/// The others are discarded with a warning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteCondition {
    conditions: BTreeMap<Key, Predicates>,
}

impl WriteCondition {
    /// An empty condition set.
    pub fn new() -> Self {
        Self::default()
    }

    fn update(mut self, key: impl Into<Key>, f: impl FnOnce(&mut Predicates)) -> Self {
        f(self.conditions.entry(key.into()).or_default());
        self
    }

    /// Require `key` to be absent.
    pub fn if_empty(self, key: impl Into<Key>) -> Self {
        self.update(key, |p| p.old_empty = Some(true))
    }

    /// Require the value at `key` to be an array.
    pub fn if_is_array(self, key: impl Into<Key>) -> Self {
        self.update(key, |p| p.is_array = Some(true))
    }

    /// Require the value at `key` to equal `old`.
    pub fn if_equal_to(self, key: impl Into<Key>, old: impl Into<Value>) -> Self {
        let old = old.into();
        self.update(key, |p| p.old = Some(old))
    }

    /// True if no predicate has been added.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Add the strongest predicate of each key to `tx`, following the
    /// precedence in the type docs.
    ///
    /// Returns how many predicates were discarded; each one is logged at
    /// `warn!`.
    pub fn apply_to(&self, tx: &mut Transaction) -> usize {
        let mut discarded = 0;
        for (key, predicates) in &self.conditions {
            let candidates = [
                predicates
                    .old
                    .clone()
                    .map(|old| ("old", Condition::if_equal(old))),
                predicates
                    .is_array
                    .map(|is_array| ("isArray", Condition::is_array(is_array))),
                predicates
                    .old_empty
                    .map(|empty| ("oldEmpty", Condition::old_empty(empty))),
            ];
            let mut present = candidates.into_iter().flatten();
            let Some((kept, condition)) = present.next() else {
                continue;
            };
            for (dropped, _) in present {
                warn!(%key, kept, dropped, "only one precondition per key is supported, discarding");
                discarded += 1;
            }
            tx.add_condition(key, condition);
        }
        discarded
    }
}

/// Capability interface of transaction objects built by older callers.
pub trait LegacyTransaction: Send + Sync {
    /// Mutations.
    fn keys(&self) -> Vec<KeyChanger>;
    /// Preconditions.
    fn conditions(&self) -> WriteCondition;
    /// Client identifier, if any.
    fn client_id(&self) -> Option<String>;
    /// Submission options.
    fn options(&self) -> TransactionOptions;
}

/// Every transaction shape [`LegacyAgency::write`] accepts.
pub enum TransactionInput<'a> {
    /// A native transaction, by value.
    Owned(Transaction),
    /// A native transaction, by reference.
    Borrowed(&'a Transaction),
    /// Anything implementing the legacy capability interface.
    Legacy(&'a dyn LegacyTransaction),
}

impl<'a> TransactionInput<'a> {
    /// Wrap a legacy transaction object.
    pub fn legacy<T: LegacyTransaction>(tx: &'a T) -> Self {
        TransactionInput::Legacy(tx)
    }

    /// Resolve to a native transaction, converting only when needed.
    pub fn into_transaction(self) -> Cow<'a, Transaction> {
        match self {
            TransactionInput::Owned(tx) => Cow::Owned(tx),
            TransactionInput::Borrowed(tx) => Cow::Borrowed(tx),
            TransactionInput::Legacy(legacy) => Cow::Owned(from_legacy(legacy)),
        }
    }
}

impl From<Transaction> for TransactionInput<'_> {
    fn from(tx: Transaction) -> Self {
        TransactionInput::Owned(tx)
    }
}

impl<'a> From<&'a Transaction> for TransactionInput<'a> {
    fn from(tx: &'a Transaction) -> Self {
        TransactionInput::Borrowed(tx)
    }
}

impl<'a> From<&'a dyn LegacyTransaction> for TransactionInput<'a> {
    fn from(tx: &'a dyn LegacyTransaction) -> Self {
        TransactionInput::Legacy(tx)
    }
}

/// Convert a legacy transaction object into a native one.
pub fn from_legacy(legacy: &dyn LegacyTransaction) -> Transaction {
    let mut tx = Transaction::new(legacy.client_id(), legacy.options());
    for changer in legacy.keys() {
        tx.add_key(changer);
    }
    legacy.conditions().apply_to(&mut tx);
    tx
}

/// The previous client generation's call shapes over an [`Agency`].
#[derive(Debug, Clone)]
pub struct LegacyAgency {
    inner: Agency,
}

impl LegacyAgency {
    /// Wrap a native client.
    pub fn new(inner: Agency) -> Self {
        Self { inner }
    }

    /// The wrapped native client.
    pub fn inner(&self) -> &Agency {
        &self.inner
    }

    /// Read the value at `key`.
    pub async fn read_key<T: DeserializeOwned>(&self, key: impl Into<Key>) -> Result<T> {
        self.inner.read_key(key).await
    }

    /// Set `key` to `value` subject to `condition`.
    pub async fn write_key<V: Serialize + ?Sized>(
        &self,
        key: impl Into<Key>,
        value: &V,
        ttl: Option<Duration>,
        condition: WriteCondition,
    ) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value)?;
        let changer = match ttl {
            Some(ttl) => KeyChanger::set_with_ttl(key, value, ttl),
            None => KeyChanger::set(key, value),
        };
        let mut tx = Transaction::default().with_key(changer);
        condition.apply_to(&mut tx);
        self.write(tx).await
    }

    /// Set `key` to `value` only if `key` is absent.
    pub async fn write_key_if_empty<V: Serialize + ?Sized>(
        &self,
        key: impl Into<Key>,
        value: &V,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let key = key.into();
        let condition = WriteCondition::new().if_empty(key.clone());
        self.write_key(key, value, ttl, condition).await
    }

    /// Set `key` to `new_value` only if it currently equals `old_value`.
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
        let condition =
            WriteCondition::new().if_equal_to(key.clone(), serde_json::to_value(old_value)?);
        self.write_key(key, new_value, ttl, condition).await
    }

    /// Delete `key` subject to `condition`.
    pub async fn remove_key(&self, key: impl Into<Key>, condition: WriteCondition) -> Result<()> {
        let mut tx = Transaction::default().with_key(KeyChanger::delete(key));
        condition.apply_to(&mut tx);
        self.write(tx).await
    }

    /// Delete `key` only if it currently equals `old_value`.
    pub async fn remove_key_if_equal_to<O: Serialize + ?Sized>(
        &self,
        key: impl Into<Key>,
        old_value: &O,
    ) -> Result<()> {
        let key = key.into();
        let condition =
            WriteCondition::new().if_equal_to(key.clone(), serde_json::to_value(old_value)?);
        self.remove_key(key, condition).await
    }

    /// Submit a transaction of any supported shape.
    pub async fn write<'a>(&self, tx: impl Into<TransactionInput<'a>>) -> Result<()> {
        let tx = tx.into().into_transaction();
        self.inner.write_transaction(&tx).await.map(drop)
    }

    /// Register a change callback.
    pub async fn register_change_callback(&self, key: impl Into<Key>, url: &str) -> Result<()> {
        self.inner.register_change_callback(key, url).await
    }

    /// Remove a change callback.
    pub async fn unregister_change_callback(&self, key: impl Into<Key>, url: &str) -> Result<()> {
        self.inner.unregister_change_callback(key, url).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testutil::{scripted, Reply};

    struct OldStyleTx;

    impl LegacyTransaction for OldStyleTx {
        fn keys(&self) -> Vec<KeyChanger> {
            vec![KeyChanger::set(["jobs", "1"], "queued")]
        }

        fn conditions(&self) -> WriteCondition {
            WriteCondition::new().if_empty(["jobs", "1"])
        }

        fn client_id(&self) -> Option<String> {
            Some("worker-7".to_string())
        }

        fn options(&self) -> TransactionOptions {
            TransactionOptions::transient()
        }
    }

    #[test]
    fn test_write_condition_accumulates_per_key() {
        let cond = WriteCondition::new()
            .if_empty(["a"])
            .if_is_array(["a"])
            .if_equal_to(["b"], 3);
        let mut tx = Transaction::default();
        assert_eq!(cond.apply_to(&mut tx), 1);

        assert_eq!(tx.conditions().len(), 2);
        assert_eq!(tx.conditions()["/a"], Condition::is_array(true));
        assert_eq!(tx.conditions()["/b"], Condition::if_equal(3));
    }

    #[test]
    fn test_equals_takes_precedence() {
        let cond = WriteCondition::new()
            .if_equal_to(["a"], "x")
            .if_empty(["a"]);
        let mut tx = Transaction::default();
        assert_eq!(cond.apply_to(&mut tx), 1);
        assert_eq!(tx.conditions()["/a"], Condition::if_equal("x"));
    }

    #[test]
    fn test_every_discarded_predicate_is_counted() {
        let cond = WriteCondition::new()
            .if_empty(["a"])
            .if_is_array(["a"])
            .if_equal_to(["a"], json!([1]))
            .if_empty(["b"]);
        let mut tx = Transaction::default().with_condition(["a"], Condition::old_empty(false));

        assert_eq!(cond.apply_to(&mut tx), 2);
        assert_eq!(tx.conditions()["/a"], Condition::if_equal(json!([1])));
        assert_eq!(tx.conditions()["/b"], Condition::old_empty(true));

        let single = WriteCondition::new().if_is_array(["c"]);
        assert_eq!(single.apply_to(&mut tx), 0);
        assert_eq!(tx.conditions().len(), 3);
    }

    #[test]
    fn test_from_legacy() {
        let tx = from_legacy(&OldStyleTx);
        assert_eq!(tx.client_id(), Some("worker-7"));
        assert!(tx.is_transient());
        assert_eq!(tx.keys().len(), 1);
        assert_eq!(tx.conditions()["/jobs/1"], Condition::old_empty(true));
    }

    #[test]
    fn test_transaction_input_resolution() {
        let native = Transaction::default().with_key(KeyChanger::delete(["a"]));
        assert!(matches!(
            TransactionInput::from(&native).into_transaction(),
            Cow::Borrowed(_)
        ));
        assert!(matches!(
            TransactionInput::from(native.clone()).into_transaction(),
            Cow::Owned(_)
        ));
        let resolved = TransactionInput::legacy(&OldStyleTx).into_transaction();
        assert_eq!(resolved.client_id(), Some("worker-7"));
    }

    #[tokio::test]
    async fn test_legacy_write_goes_to_transient_endpoint() {
        let (agency, conn) = scripted(
            "http://leader:8531",
            vec![Reply::Status(200, json!({"results": [4]}))],
        );
        let legacy = LegacyAgency::new(agency);
        legacy.write(TransactionInput::legacy(&OldStyleTx)).await.unwrap();

        let sent = conn.sent();
        assert_eq!(sent[0].1.path, crate::client::TRANSIENT_PATH);
        assert_eq!(
            sent[0].1.body,
            Some(json!([[
                {"/jobs/1": {"op": "set", "new": "queued"}},
                {"/jobs/1": {"oldEmpty": true}},
                "worker-7"
            ]]))
        );
    }

    #[tokio::test]
    async fn test_legacy_remove_with_condition() {
        let (agency, conn) = scripted(
            "http://leader:8531",
            vec![Reply::Status(412, json!({"results": [0]}))],
        );
        let legacy = LegacyAgency::new(agency);
        let err = legacy
            .remove_key(["a"], WriteCondition::new().if_equal_to(["a"], 1))
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
        assert_eq!(
            conn.sent()[0].1.body,
            Some(json!([[{"/a": {"op": "delete"}}, {"/a": {"old": 1}}]]))
        );
    }
}
