//! Credential rotation
//!
//! Workers that scrape login-walled pages share a [`CredentialRotator`]
//! handing out cookie jars in strict round-robin order.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Error type for credential pools
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Pool is empty or cannot be read
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// An opaque bundle of session cookies used to authenticate a fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialSet {
    cookies: BTreeMap<String, String>,
}

impl CredentialSet {
    /// Create a credential set from cookie name/value pairs
    pub fn new<K, V>(cookies: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cookies: cookies
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a cookie value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Render as a `Cookie` request header value (`a=1; b=2`)
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Round-robin rotation over a fixed credential pool
///
/// The position is a single shared counter advanced with a compare-and-swap,
/// so concurrent callers never observe the same slot twice within one lap
/// and never skip a slot.
///
/// # Example
///
/// ```
/// use crawlmark_harvester::credentials::{CredentialRotator, CredentialSet};
///
/// let rotator = CredentialRotator::new(vec![
///     CredentialSet::new([("a", "1")]),
///     CredentialSet::new([("b", "2")]),
/// ])
/// .unwrap();
///
/// assert_eq!(rotator.next().get("a"), Some("1"));
/// assert_eq!(rotator.next().get("b"), Some("2"));
/// assert_eq!(rotator.next().get("a"), Some("1"));
/// ```
#[derive(Debug)]
pub struct CredentialRotator {
    pool: Vec<Arc<CredentialSet>>,
    position: AtomicUsize,
}

impl CredentialRotator {
    /// Create a rotator; fails on an empty pool
    pub fn new(pool: Vec<CredentialSet>) -> Result<Self, CredentialError> {
        if pool.is_empty() {
            return Err(CredentialError::InvalidConfiguration(
                "credential pool cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            pool: pool.into_iter().map(Arc::new).collect(),
            position: AtomicUsize::new(0),
        })
    }

    /// Load a pool from a JSON file holding an array of cookie maps
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CredentialError::InvalidConfiguration(format!(
                "cannot read credential file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    /// Parse a pool from a JSON array of cookie maps
    pub fn from_json(raw: &str) -> Result<Self, CredentialError> {
        let pool: Vec<CredentialSet> = serde_json::from_str(raw).map_err(|e| {
            CredentialError::InvalidConfiguration(format!("malformed credential pool: {}", e))
        })?;
        Self::new(pool)
    }

    /// Hand out the next credential set
    pub fn next(&self) -> Arc<CredentialSet> {
        let index = self.next_index();
        Arc::clone(&self.pool[index])
    }

    /// Advance the shared position and return the slot it pointed at
    pub fn next_index(&self) -> usize {
        let len = self.pool.len();
        // fetch_update only fails when the closure returns None
        match self
            .position
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
        {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Number of credential sets in the pool
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}
