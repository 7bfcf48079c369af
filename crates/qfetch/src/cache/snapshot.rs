//! Snapshots: the serialized cache produced by a prefetch pass and consumed
//! by hydration.
//!
//! The wire format is a flat JSON object mapping cache keys to JSON-encoded
//! string values:
//!
//! ```json
//! {"getArtwork(https://api/1)":"{\"title\":\"Nighthawks\"}"}
//! ```
//!
//! No version field is written. An entry whose value has an unexpected shape
//! degrades only its own query to a live fetch.

use std::collections::BTreeMap;

use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::cache::CacheEntry;

/// Error produced when the snapshot text is not a JSON object.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The text is not a JSON object.
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A hydrated snapshot.
///
/// Entries are read-only lookups until their query is first subscribed to;
/// from then on the entry is spent and the live query owns freshness.
#[derive(Debug, Default)]
pub struct Snapshot {
    entries: DashMap<String, String>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Parses snapshot text produced by a prefetch pass.
    ///
    /// Entries whose value is not a string are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Malformed`] if `text` is not a JSON object.
    pub fn parse(text: &str) -> Result<Self, SnapshotError> {
        let object = serde_json::from_str::<Map<String, Value>>(text)?;
        let entries = DashMap::with_capacity(object.len());

        for (key, value) in object {
            match value {
                Value::String(value) => {
                    entries.insert(key, value);
                }
                other => {
                    tracing::warn!(
                        %key,
                        kind = value_kind(&other),
                        "skipping snapshot entry that is not a string"
                    );
                }
            }
        }

        Ok(Self { entries })
    }

    /// Builds a snapshot from cache entries. A later entry with an existing
    /// key is ignored.
    pub fn from_entries(
        entries: impl IntoIterator<Item = CacheEntry>,
    ) -> Self {
        let snapshot = Self::new();
        for entry in entries {
            snapshot.insert(entry);
        }
        snapshot
    }

    /// Adds an entry unless its key is already present.
    pub fn insert(&self, entry: CacheEntry) -> bool {
        match self.entries.entry(entry.key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(entry.value);
                true
            }
        }
    }

    /// Returns the serialized value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|value| value.clone())
    }

    /// Removes and returns the entry stored under `key`.
    pub fn spend(&self, key: &str) -> Option<String> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    /// Returns `true` if an unspent entry is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the number of unspent entries.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Returns `true` if every entry is spent.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Returns the unspent entries, sorted by key.
    #[must_use]
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries = self
            .entries
            .iter()
            .map(|entry| CacheEntry::new(entry.key(), entry.value()))
            .collect::<Vec<_>>();

        entries.sort_unstable();
        entries
    }

    /// Serializes the unspent entries with sorted keys.
    #[must_use]
    pub fn to_json(&self) -> String {
        render(
            self.entries()
                .into_iter()
                .map(|entry| (entry.key, entry.value))
                .collect(),
        )
    }
}

/// Accumulates the successful outcomes written during a prefetch pass.
///
/// A prefetch pass has a single logical writer; the lock only makes the
/// collector shareable between the tasks the pass forks. The first entry
/// written for a key wins.
#[derive(Debug, Default)]
pub struct PrefetchCollector {
    entries: Mutex<BTreeMap<String, String>>,
}

impl PrefetchCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Records an entry. Returns `false` if the key was already recorded.
    pub fn record(&self, entry: CacheEntry) -> bool {
        let mut entries = self.entries.lock();

        if entries.contains_key(&entry.key) {
            tracing::trace!(key = %entry.key, "entry already collected");
            return false;
        }

        entries.insert(entry.key, entry.value);
        true
    }

    /// Returns the number of collected entries.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.lock().len() }

    /// Returns `true` if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.lock().is_empty() }

    /// Returns the snapshot text of everything collected so far.
    #[must_use]
    pub fn snapshot_text(&self) -> String {
        render(self.entries.lock().clone())
    }

    /// Returns a hydrated snapshot of everything collected so far.
    #[must_use]
    pub fn to_snapshot(&self) -> Snapshot {
        let entries = self.entries.lock().clone().into_iter().collect();

        Snapshot { entries }
    }
}

fn render(entries: BTreeMap<String, String>) -> String {
    let object = entries
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect::<Map<_, _>>();

    Value::Object(object).to_string()
}

const fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
