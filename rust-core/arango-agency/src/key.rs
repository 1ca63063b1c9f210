// SPDX-License-Identifier: PMPL-1.0-or-later
//! Agency key paths.
//!
//! A key is an ordered list of segments naming a node in the agency's JSON
//! tree. On the wire, and as the map key for mutations and conditions, it is
//! written as `"/" + segments.join("/")`.

use std::fmt;

/// Root segment under which the database keeps its cluster metadata.
pub const ARANGO_ROOT: &str = "arango";

/// A path into the agency's JSON tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Vec<String>);

impl Key {
    /// Build a key from its segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Build a key below the `arango` root.
    pub fn arango<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut key = Self::new([ARANGO_ROOT]);
        key.0.extend(segments.into_iter().map(Into::into));
        key
    }

    /// Parse a slash-separated key. Empty segments are skipped, so
    /// `"/a//b/"` and `"a/b"` are the same key.
    pub fn parse(full_key: &str) -> Self {
        Self::new(full_key.split('/').filter(|s| !s.is_empty()))
    }

    /// The key's segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the root key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wire form: `"/" + segments.join("/")`.
    pub fn full_key(&self) -> String {
        format!("/{}", self.0.join("/"))
    }

    /// This key extended by one segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut key = self.clone();
        key.0.push(segment.into());
        key
    }

    /// The first `len` segments.
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_key())
    }
}

impl From<&[&str]> for Key {
    fn from(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Key {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

impl From<Vec<String>> for Key {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}
