//! Request definitions: the units of fetch work answered by a
//! [`DataSource`](crate::data_source::DataSource).
//!
//! A request is an immutable value that identifies one piece of work. Two
//! requests are the same request iff they are structurally equal, which is
//! why the trait requires [`Eq`] and [`Hash`]: the
//! [`CompletionMap`](crate::completion::CompletionMap) is keyed by request
//! identity.
//!
//! A data source usually serves a *family* of requests, expressed as an enum
//! whose variants carry a discriminant and the parameters needed to answer
//! them:
//!
//! ```rust
//! use qfetch::request::Request;
//!
//! #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! enum MuseumRequest {
//!     Artworks { page: u32 },
//!     Artwork { url: String },
//! }
//!
//! impl Request for MuseumRequest {
//!     type Value = String;
//!     type Error = String;
//! }
//! ```

use std::{fmt::Debug, hash::Hash};

/// A unit of fetch work identified by structural equality.
pub trait Request: Debug + Clone + Eq + Hash + Send + Sync + 'static {
    /// The value produced when the request succeeds.
    type Value: Debug + Clone + Send + Sync + 'static;

    /// The error produced when the request fails.
    ///
    /// Errors are carried as values inside the completion map, so they must
    /// be cloneable: a failure of a whole batch is replicated to every request
    /// of that batch.
    type Error: Debug + Clone + Send + Sync + 'static;
}

/// An ordered collection of requests submitted together by one caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Batch<R> {
    requests: Vec<R>,
}

impl<R> Batch<R> {
    /// Creates a batch from the given requests, keeping their order.
    #[must_use]
    pub const fn new(requests: Vec<R>) -> Self { Self { requests } }

    /// Creates a batch holding exactly one request.
    #[must_use]
    pub fn single(request: R) -> Self { Self { requests: vec![request] } }

    /// Returns the number of requests in the batch.
    #[must_use]
    pub const fn len(&self) -> usize { self.requests.len() }

    /// Returns `true` if the batch holds no requests.
    #[must_use]
    pub const fn is_empty(&self) -> bool { self.requests.is_empty() }

    /// Iterates over the requests in submission order.
    pub fn iter(&self) -> std::slice::Iter<'_, R> { self.requests.iter() }

    /// Returns the requests as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[R] { &self.requests }
}

impl<R> Default for Batch<R> {
    fn default() -> Self { Self { requests: Vec::new() } }
}

impl<R> From<Vec<R>> for Batch<R> {
    fn from(requests: Vec<R>) -> Self { Self { requests } }
}

impl<R> FromIterator<R> for Batch<R> {
    fn from_iter<T: IntoIterator<Item = R>>(iter: T) -> Self {
        Self { requests: iter.into_iter().collect() }
    }
}

impl<R> IntoIterator for Batch<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter { self.requests.into_iter() }
}

impl<'a, R> IntoIterator for &'a Batch<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter { self.requests.iter() }
}

/// Iterates over every request of every batch, in order.
pub(crate) fn flatten<R>(batches: &[Batch<R>]) -> impl Iterator<Item = &R> {
    batches.iter().flat_map(Batch::iter)
}
