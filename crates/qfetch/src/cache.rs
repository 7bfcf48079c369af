//! Cache codecs: how query outcomes are written into, and read back from, a
//! [`Snapshot`].
//!
//! A [`Codec`] maps a query's arguments and outcome to at most one
//! [`CacheEntry`], and maps the arguments plus a snapshot back to at most one
//! outcome. Codecs own no state.
//!
//! Cache keys must be injective over the query arguments. Two different
//! queries that produce the same key silently share an entry; no collision
//! detection is performed.

use serde::{Serialize, de::DeserializeOwned};

use crate::query::{Outcome, Query};

pub mod snapshot;

pub use snapshot::{PrefetchCollector, Snapshot, SnapshotError};

/// One serialized query outcome.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheEntry {
    /// The key derived from the query arguments.
    pub key: String,

    /// The serialized outcome.
    pub value: String,
}

impl CacheEntry {
    /// Creates a new cache entry.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Error produced while converting between an outcome and its cache entry.
///
/// Never propagated out of the engine: an entry that fails to encode is not
/// written, and an entry that fails to decode degrades its query to a cold
/// start.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The outcome could not be serialized.
    #[error("failed to encode cache entry `{key}`: {source}")]
    Encode {
        /// The key of the entry.
        key: String,

        /// The underlying serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// The serialized entry does not have the expected shape.
    #[error("failed to decode cache entry `{key}`: {source}")]
    Decode {
        /// The key of the entry.
        key: String,

        /// The underlying deserializer error.
        #[source]
        source: serde_json::Error,
    },
}

/// Converts the outcome of a query to and from a cache entry.
pub trait Codec<Q: Query>: Send + Sync + 'static {
    /// The cache key for `query`.
    fn key(&self, query: &Q) -> String;

    /// Serializes `outcome`, or returns `None` if it must not be cached.
    fn encode(&self, query: &Q, outcome: &Outcome<Q>) -> Option<CacheEntry>;

    /// Looks `query` up in `snapshot` and decodes its outcome.
    ///
    /// Returns `None` if the snapshot has no usable entry.
    fn decode(&self, query: &Q, snapshot: &Snapshot) -> Option<Outcome<Q>>;
}

/// A JSON codec that caches only successful outcomes.
///
/// The key function is typically a readable rendering of the query, such as
/// `getArtworks(1)`.
///
/// ```rust
/// use qfetch::{
///     cache::{Codec, Snapshot, SuccessCodec},
///     query::Query,
/// };
///
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// struct GetArtworks {
///     page: u32,
/// }
///
/// impl Query for GetArtworks {
///     type Value = Vec<String>;
///     type Error = String;
/// }
///
/// let codec = SuccessCodec::new(|query: &GetArtworks| {
///     format!("getArtworks({})", query.page)
/// });
///
/// let query = GetArtworks { page: 1 };
/// let entry = codec.encode(&query, &Ok(vec!["a".to_owned()])).unwrap();
/// assert_eq!(entry.key, "getArtworks(1)");
///
/// let snapshot = Snapshot::from_entries([entry]);
/// assert_eq!(codec.decode(&query, &snapshot), Some(Ok(vec!["a".to_owned()])));
/// ```
pub struct SuccessCodec<K> {
    key: K,
}

impl<K> std::fmt::Debug for SuccessCodec<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuccessCodec").finish_non_exhaustive()
    }
}

impl<K> SuccessCodec<K> {
    /// Creates a codec deriving cache keys with `key`.
    pub const fn new(key: K) -> Self { Self { key } }
}

impl<Q, K> Codec<Q> for SuccessCodec<K>
where
    Q: Query,
    Q::Value: Serialize + DeserializeOwned,
    K: Fn(&Q) -> String + Send + Sync + 'static,
{
    fn key(&self, query: &Q) -> String { (self.key)(query) }

    fn encode(&self, query: &Q, outcome: &Outcome<Q>) -> Option<CacheEntry> {
        let value = outcome.as_ref().ok()?;
        let key = (self.key)(query);

        match serde_json::to_string(value) {
            Ok(value) => Some(CacheEntry { key, value }),
            Err(source) => {
                let error = CacheError::Encode { key, source };
                tracing::warn!(%error, "outcome will not be cached");
                None
            }
        }
    }

    fn decode(&self, query: &Q, snapshot: &Snapshot) -> Option<Outcome<Q>> {
        let key = (self.key)(query);
        let raw = snapshot.get(&key)?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(Ok(value)),
            Err(source) => {
                let error = CacheError::Decode { key, source };
                tracing::warn!(%error, "falling back to a live fetch");
                None
            }
        }
    }
}
