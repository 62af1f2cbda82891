//! Vector clocks and causal ordering

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Causal relation between two clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    /// Every entry of the left clock is <= the right one, at least one strictly
    Before,
    /// Mirror of `Before`
    After,
    /// Identical on every author
    Equal,
    /// Neither clock dominates the other
    Concurrent,
}

/// Per-author operation counters.
///
/// Authors missing from the map count as zero, so `{}` and `{"a": 0}`
/// compare `Equal`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<String, u64>);

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for `author`, zero when absent
    pub fn get(&self, author: &str) -> u64 {
        self.0.get(author).copied().unwrap_or(0)
    }

    pub fn set(&mut self, author: impl Into<String>, count: u64) {
        self.0.insert(author.into(), count);
    }

    /// Bump the counter for `author` and return the new value
    pub fn increment(&mut self, author: &str) -> u64 {
        let entry = self.0.entry(author.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Component-wise max. Entries never decrease.
    pub fn merge(&mut self, other: &VectorClock) {
        for (author, &count) in &other.0 {
            let entry = self.0.entry(author.clone()).or_insert(0);
            if count > *entry {
                *entry = count;
            }
        }
    }

    /// Compare over the union of both key sets.
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut less = false;
        let mut greater = false;

        for author in self.0.keys().chain(other.0.keys()) {
            match self.get(author).cmp(&other.get(author)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
            if less && greater {
                return ClockOrdering::Concurrent;
            }
        }

        match (less, greater) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    pub fn happened_before(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::Before
    }

    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::Concurrent
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|&count| count == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(author, &count)| (author.as_str(), count))
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
