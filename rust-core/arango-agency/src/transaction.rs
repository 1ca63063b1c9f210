// SPDX-License-Identifier: PMPL-1.0-or-later
//! Agency transaction model.
//!
//! A [`Transaction`] is a list of key mutations ([`KeyChanger`]), a map of
//! preconditions ([`Condition`]) keyed by full key path, an optional client
//! identifier, and [`TransactionOptions`]. Building one performs no I/O and
//! cannot fail; submitting it is the job of
//! [`Agency::write_transaction`](crate::Agency::write_transaction).
//!
//! # Wire format
//!
//! ```text
//! [ [ { "/a/b": {"op": "set", "new": 1} },      // mutations by key
//!     { "/a/b": {"oldEmpty": true} },            // conditions by key
//!     "client-id" ] ]                            // optional
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::key::Key;

/// The operation a [`KeyChanger`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Replace the value.
    Set,
    /// Remove the key and its subtree.
    Delete,
    /// Add one to a numeric value (missing counts as 0).
    Increment,
    /// Subtract one from a numeric value (missing counts as 0).
    Decrement,
    /// Append to an array, creating it if needed.
    Push,
    /// Remove all occurrences of a value from an array.
    Erase,
    /// Register a change callback URL.
    Observe,
    /// Remove a change callback URL.
    Unobserve,
}

impl Operation {
    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Set => "set",
            Operation::Delete => "delete",
            Operation::Increment => "increment",
            Operation::Decrement => "decrement",
            Operation::Push => "push",
            Operation::Erase => "erase",
            Operation::Observe => "observe",
            Operation::Unobserve => "unobserve",
        }
    }
}

/// A single mutation of one key.
///
/// A TTL is only carried by [`KeyChanger::set_with_ttl`]; every other
/// operation ignores expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyChanger {
    key: Key,
    operation: Operation,
    new: Option<Value>,
    ttl: Option<Duration>,
    url: Option<String>,
    val: Option<Value>,
}

impl KeyChanger {
    fn bare(key: impl Into<Key>, operation: Operation) -> Self {
        Self {
            key: key.into(),
            operation,
            new: None,
            ttl: None,
            url: None,
            val: None,
        }
    }

    /// Set `key` to `value`.
    pub fn set(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self {
            new: Some(value.into()),
            ..Self::bare(key, Operation::Set)
        }
    }

    /// Set `key` to `value`, expiring after `ttl`.
    pub fn set_with_ttl(key: impl Into<Key>, value: impl Into<Value>, ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::set(key, value)
        }
    }

    /// Delete `key`.
    pub fn delete(key: impl Into<Key>) -> Self {
        Self::bare(key, Operation::Delete)
    }

    /// Increment the number stored at `key`.
    pub fn increment(key: impl Into<Key>) -> Self {
        Self::bare(key, Operation::Increment)
    }

    /// Decrement the number stored at `key`.
    pub fn decrement(key: impl Into<Key>) -> Self {
        Self::bare(key, Operation::Decrement)
    }

    /// Append `value` to the array at `key`.
    pub fn push(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self {
            new: Some(value.into()),
            ..Self::bare(key, Operation::Push)
        }
    }

    /// Remove every element equal to `value` from the array at `key`.
    pub fn erase(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self {
            val: Some(value.into()),
            ..Self::bare(key, Operation::Erase)
        }
    }

    /// Ask the agency to POST to `url` whenever `key` changes.
    pub fn observe(key: impl Into<Key>, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::bare(key, Operation::Observe)
        }
    }

    /// Stop calling `url` on changes of `key`.
    pub fn unobserve(key: impl Into<Key>, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::bare(key, Operation::Unobserve)
        }
    }

    /// Target key.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Operation kind.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// New value, for `set` and `push`.
    pub fn new_value(&self) -> Option<&Value> {
        self.new.as_ref()
    }

    /// Expiry, for `set`.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Callback URL, for `observe` / `unobserve`.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Raw value, for `erase`.
    pub fn val(&self) -> Option<&Value> {
        self.val.as_ref()
    }

    /// Operation descriptor as sent on the wire.
    pub fn descriptor(&self) -> Value {
        #[derive(Serialize)]
        struct Descriptor<'a> {
            op: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            new: Option<&'a Value>,
            #[serde(skip_serializing_if = "Option::is_none")]
            ttl: Option<u64>,
            #[serde(skip_serializing_if = "Option::is_none")]
            url: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            val: Option<&'a Value>,
        }

        let descriptor = Descriptor {
            op: self.operation.as_str(),
            new: self.new.as_ref(),
            ttl: self
                .ttl
                .filter(|_| self.operation == Operation::Set)
                .map(|d| d.as_secs())
                .filter(|secs| *secs > 0),
            url: self.url.as_deref(),
            val: self.val.as_ref(),
        };
        json!(descriptor)
    }
}

/// A precondition on one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The current value must equal the given value.
    IfEqual(Value),
    /// The key must (`true`) or must not (`false`) be absent.
    OldEmpty(bool),
    /// The current value must (`true`) or must not (`false`) be an array.
    IsArray(bool),
}

impl Condition {
    /// Require the current value to equal `old`.
    pub fn if_equal(old: impl Into<Value>) -> Self {
        Condition::IfEqual(old.into())
    }

    /// Require the key to be absent (`true`) or present (`false`).
    pub fn old_empty(empty: bool) -> Self {
        Condition::OldEmpty(empty)
    }

    /// Require the value to be (`true`) or not be (`false`) an array.
    pub fn is_array(is_array: bool) -> Self {
        Condition::IsArray(is_array)
    }

    /// Condition name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Condition::IfEqual(_) => "old",
            Condition::OldEmpty(_) => "oldEmpty",
            Condition::IsArray(_) => "isArray",
        }
    }

    /// Condition operand.
    pub fn value(&self) -> Value {
        match self {
            Condition::IfEqual(v) => v.clone(),
            Condition::OldEmpty(b) | Condition::IsArray(b) => Value::Bool(*b),
        }
    }

    /// Single-entry object `{name: value}` as sent on the wire.
    pub fn descriptor(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.name().to_string(), self.value());
        Value::Object(map)
    }
}

/// Submission options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Write to the transient (non-persistent) store instead of the
    /// replicated log.
    pub transient: bool,
}

impl TransactionOptions {
    /// Options targeting the transient store.
    pub fn transient() -> Self {
        Self { transient: true }
    }
}

/// Generate a fresh client identifier.
pub fn new_client_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// An atomic agency transaction.
///
/// Owned by the caller; the client only borrows it for submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    keys: Vec<KeyChanger>,
    conditions: BTreeMap<String, Condition>,
    client_id: Option<String>,
    options: TransactionOptions,
}

impl Transaction {
    /// Empty transaction with the given client id and options.
    pub fn new(client_id: Option<String>, options: TransactionOptions) -> Self {
        Self {
            keys: Vec::new(),
            conditions: BTreeMap::new(),
            client_id,
            options,
        }
    }

    /// Append a mutation.
    ///
    /// Mutations are keyed by full key on the wire, so a second mutation of
    /// the same key replaces the first.
    pub fn add_key(&mut self, changer: KeyChanger) -> &mut Self {
        self.keys.push(changer);
        self
    }

    /// Attach a precondition to `key`.
    ///
    /// One predicate per key: adding a second condition for the same key
    /// replaces the first.
    pub fn add_condition(&mut self, key: impl Into<Key>, condition: Condition) -> &mut Self {
        self.conditions.insert(key.into().full_key(), condition);
        self
    }

    /// Builder-style [`add_key`](Self::add_key).
    pub fn with_key(mut self, changer: KeyChanger) -> Self {
        self.add_key(changer);
        self
    }

    /// Builder-style [`add_condition`](Self::add_condition).
    pub fn with_condition(mut self, key: impl Into<Key>, condition: Condition) -> Self {
        self.add_condition(key, condition);
        self
    }

    /// Mutations, in insertion order.
    pub fn keys(&self) -> &[KeyChanger] {
        &self.keys
    }

    /// Conditions by full key.
    pub fn conditions(&self) -> &BTreeMap<String, Condition> {
        &self.conditions
    }

    /// Client identifier, if any.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Submission options.
    pub fn options(&self) -> TransactionOptions {
        self.options
    }

    /// True if the transaction targets the transient store.
    pub fn is_transient(&self) -> bool {
        self.options.transient
    }

    /// Request body: a one-element batch holding this transaction.
    pub fn to_wire(&self) -> Value {
        let mutations: Map<String, Value> = self
            .keys
            .iter()
            .map(|k| (k.key().full_key(), k.descriptor()))
            .collect();
        let conditions: Map<String, Value> = self
            .conditions
            .iter()
            .map(|(key, condition)| (key.clone(), condition.descriptor()))
            .collect();

        let mut entry = vec![Value::Object(mutations), Value::Object(conditions)];
        if let Some(id) = &self.client_id {
            entry.push(Value::String(id.clone()));
        }
        Value::Array(vec![Value::Array(entry)])
    }
}
