// SPDX-License-Identifier: PMPL-1.0-or-later
//! Endpoint parsing and the shared endpoint list.
//!
//! Cluster members advertise themselves with scheme aliases (`tcp://`,
//! `ssl://`, `http+ssl://`, ...) that HTTP clients do not understand, so every
//! endpoint that enters an [`EndpointList`] goes through
//! [`normalize_endpoint`] first.
//!
//! The list itself is read-copy-update: the whole `Arc<Vec<_>>` is swapped on
//! replacement, so a reader racing with a leader failover sees either the old
//! list or the new one, never a mix.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use url::Url;

use crate::error::{ConnectionError, Result};

/// Scheme aliases used in cluster configuration and `Location` headers.
const SCHEME_ALIASES: &[(&str, &str)] = &[
    ("http+tcp://", "http://"),
    ("http+ssl://", "https://"),
    ("https+tcp://", "https://"),
    ("https+ssl://", "https://"),
    ("tcp://", "http://"),
    ("ssl://", "https://"),
];

/// Replace a scheme alias with the plain HTTP scheme it stands for.
///
/// Strings without a known alias are returned unchanged (trimmed).
pub fn fixup_scheme(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    let lower = trimmed.to_ascii_lowercase();
    for (alias, scheme) in SCHEME_ALIASES {
        if lower.starts_with(alias) {
            return format!("{scheme}{}", &trimmed[alias.len()..]);
        }
    }
    trimmed.to_string()
}

fn parse(endpoint: &str) -> Result<Url> {
    let fixed = fixup_scheme(endpoint);
    let url = Url::parse(&fixed).map_err(|e| ConnectionError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ConnectionError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            })
        }
    }
    if url.host_str().is_none() {
        return Err(ConnectionError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

/// Parse and canonicalise an endpoint: scheme aliases are resolved, and the
/// trailing slash is dropped so that request paths can be appended directly.
///
/// A path prefix (for example behind a reverse proxy) is preserved.
pub fn normalize_endpoint(endpoint: &str) -> Result<String> {
    let url = parse(endpoint)?;
    let origin = url.origin().ascii_serialization();
    let path = url.path().trim_end_matches('/');
    Ok(format!("{origin}{path}"))
}

/// Reduce a URL (typically a redirect `Location`) to the endpoint that
/// serves it: scheme, host and port only.
pub fn endpoint_origin(location: &str) -> Result<String> {
    let url = parse(location)?;
    Ok(url.origin().ascii_serialization())
}

/// Ordered, atomically replaceable set of endpoints with round-robin
/// selection.
#[derive(Debug)]
pub struct EndpointList {
    current: RwLock<Arc<Vec<String>>>,
    cursor: AtomicUsize,
}

impl EndpointList {
    /// Build a list from raw endpoint strings.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NoEndpoints`] for an empty input,
    /// [`ConnectionError::InvalidEndpoint`] if any entry fails to parse.
    pub fn new<I, S>(endpoints: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = Self::normalize_all(endpoints)?;
        Ok(Self {
            current: RwLock::new(Arc::new(normalized)),
            cursor: AtomicUsize::new(0),
        })
    }

    fn normalize_all<I, S>(endpoints: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = endpoints
            .into_iter()
            .map(|e| normalize_endpoint(e.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        if normalized.is_empty() {
            return Err(ConnectionError::NoEndpoints);
        }
        Ok(normalized)
    }

    /// Current list. The returned `Arc` is a stable snapshot.
    pub fn snapshot(&self) -> Arc<Vec<String>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap in a new list. On error the previous list stays in place.
    pub fn replace<I, S>(&self, endpoints: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = Arc::new(Self::normalize_all(endpoints)?);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = normalized;
        self.cursor.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Pick the next endpoint, round-robin.
    pub fn next(&self) -> String {
        let list = self.snapshot();
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % list.len();
        list[idx].clone()
    }

    /// Number of endpoints in the current list.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Always false; a list is never empty once built.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixup_scheme_aliases() {
        assert_eq!(fixup_scheme("tcp://agent:8531"), "http://agent:8531");
        assert_eq!(fixup_scheme("ssl://agent:8531"), "https://agent:8531");
        assert_eq!(fixup_scheme("http+ssl://agent:8531"), "https://agent:8531");
        assert_eq!(fixup_scheme("HTTP+TCP://agent:8531"), "http://agent:8531");
        assert_eq!(fixup_scheme(" http://agent:8531 "), "http://agent:8531");
    }

    #[test]
    fn test_normalize_drops_trailing_slash() {
        assert_eq!(
            normalize_endpoint("http://leader:8531/").unwrap(),
            "http://leader:8531"
        );
        assert_eq!(
            normalize_endpoint("tcp://10.0.0.1:8529").unwrap(),
            "http://10.0.0.1:8529"
        );
        assert_eq!(
            normalize_endpoint("https://proxy/arango/").unwrap(),
            "https://proxy/arango"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_endpoint("bad url").is_err());
        assert!(normalize_endpoint("ftp://agent:21").is_err());
    }

    #[test]
    fn test_endpoint_origin_strips_path() {
        assert_eq!(
            endpoint_origin("ssl://leader:8531/_api/agency/read").unwrap(),
            "https://leader:8531"
        );
    }

    #[test]
    fn test_round_robin() {
        let list = EndpointList::new(["http://a:1", "http://b:2"]).unwrap();
        assert_eq!(list.next(), "http://a:1");
        assert_eq!(list.next(), "http://b:2");
        assert_eq!(list.next(), "http://a:1");
    }

    #[test]
    fn test_replace_is_atomic_and_resets_cursor() {
        let list = EndpointList::new(["http://a:1", "http://b:2"]).unwrap();
        let before = list.snapshot();
        list.next();

        list.replace(["http://leader:8531"]).unwrap();
        assert_eq!(*list.snapshot(), vec!["http://leader:8531".to_string()]);
        assert_eq!(list.next(), "http://leader:8531");

        // Snapshots taken earlier are unaffected.
        assert_eq!(before.len(), 2);
    }

    #[test]
    fn test_replace_rejects_empty_and_keeps_old() {
        let list = EndpointList::new(["http://a:1"]).unwrap();
        let empty: Vec<String> = Vec::new();
        assert!(matches!(
            list.replace(empty),
            Err(ConnectionError::NoEndpoints)
        ));
        assert!(list.replace(["not a url"]).is_err());
        assert_eq!(*list.snapshot(), vec!["http://a:1".to_string()]);
    }
}
