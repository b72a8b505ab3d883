//! Diffing successive generations of configured keys.

use crate::error::ValidationError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// The set of keys a policy consumer currently has installed.
///
/// Each consumer owns one `KeySet`. After applying the entries of a freshly
/// parsed config, the consumer hands the new key set to
/// [`diff_and_emplace`](Self::diff_and_emplace) and resets or deletes whatever
/// keys it gets back, so nothing from an older generation lingers.
///
/// # Examples
///
/// ```rust
/// use hotswap_policy::core::KeySet;
/// use std::collections::HashSet;
///
/// let installed = KeySet::from_keys(["A", "B", "C"]);
///
/// let next: HashSet<String> = ["B", "C", "D"].into_iter().map(String::from).collect();
/// let removed = installed.diff_and_emplace(next);
///
/// assert_eq!(removed, vec!["A".to_string()]);
/// assert!(installed.contains("D"));
/// ```
#[derive(Debug, Default)]
pub struct KeySet {
    keys: Mutex<HashSet<String>>,
}

impl KeySet {
    /// Create an empty key set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a key set primed with `keys`.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: Mutex::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    /// Add a key to the current generation.
    pub fn insert(&self, key: impl Into<String>) -> bool {
        self.keys.lock().insert(key.into())
    }

    /// Whether `key` is in the current generation.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().contains(key)
    }

    /// Number of keys in the current generation.
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    /// Whether the current generation is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }

    /// Copy of the current generation.
    pub fn snapshot(&self) -> HashSet<String> {
        self.keys.lock().clone()
    }

    /// Replace the current generation with `next`, returning the keys that
    /// were present before but are absent from `next`.
    ///
    /// The diff and the replacement happen under one lock, so concurrent
    /// callers never compute a removal against a half-updated set. The
    /// returned keys are sorted.
    pub fn diff_and_emplace(&self, next: HashSet<String>) -> Vec<String> {
        let mut keys = self.keys.lock();
        let previous = std::mem::replace(&mut *keys, next);
        let mut removed: Vec<String> = previous
            .into_iter()
            .filter(|key| !keys.contains(key))
            .collect();
        removed.sort_unstable();
        removed
    }

    /// Apply one generation of per-key entries and return the keys to remove.
    ///
    /// `apply` runs once per entry. An entry it rejects is logged and skipped
    /// but still counts as present, so whatever was installed for that key
    /// before stays in place. The returned keys are the ones missing from
    /// `entries` entirely.
    pub fn reconcile<P, F>(&self, entries: &HashMap<String, P>, mut apply: F) -> Vec<String>
    where
        F: FnMut(&str, &P) -> Result<(), ValidationError>,
    {
        let mut next = HashSet::with_capacity(entries.len());
        for (key, entry) in entries {
            next.insert(key.clone());
            if let Err(e) = apply(key, entry) {
                warn!(key = %key, error = %e, "invalid entry, skip");
            }
        }
        self.diff_and_emplace(next)
    }
}
