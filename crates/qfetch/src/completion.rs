//! The completion map: per-tick outcomes keyed by request identity.

use std::collections::hash_map::Entry;

use fxhash::FxHashMap;

use crate::request::{Batch, Request, flatten};

/// The outcome of a single request.
pub type Outcome<R> = Result<<R as Request>::Value, <R as Request>::Error>;

/// A mapping from request to its outcome, built incrementally while a batch is
/// answered and merged across sub-batches.
///
/// Once a request has been inserted its outcome is never overwritten: later
/// inserts and merges for the same request are ignored.
#[derive(Debug, Clone)]
pub struct CompletionMap<R: Request> {
    outcomes: FxHashMap<R, Outcome<R>>,
}

impl<R: Request> Default for CompletionMap<R> {
    fn default() -> Self { Self { outcomes: FxHashMap::default() } }
}

impl<R: Request> CompletionMap<R> {
    /// Creates an empty completion map.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Records the outcome of `request`.
    ///
    /// Returns `false`, leaving the map untouched, if the request already has
    /// an outcome.
    pub fn insert(&mut self, request: R, outcome: Outcome<R>) -> bool {
        match self.outcomes.entry(request) {
            Entry::Occupied(occupied) => {
                tracing::trace!(
                    request = ?occupied.key(),
                    "ignoring second outcome for an answered request"
                );
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(outcome);
                true
            }
        }
    }

    /// Records a successful outcome for `request`.
    pub fn succeed(&mut self, request: R, value: R::Value) -> bool {
        self.insert(request, Ok(value))
    }

    /// Records a failed outcome for `request`.
    pub fn fail(&mut self, request: R, error: R::Error) -> bool {
        self.insert(request, Err(error))
    }

    /// Returns the outcome recorded for `request`, if any.
    #[must_use]
    pub fn get(&self, request: &R) -> Option<&Outcome<R>> {
        self.outcomes.get(request)
    }

    /// Returns `true` if `request` has an outcome.
    #[must_use]
    pub fn contains(&self, request: &R) -> bool {
        self.outcomes.contains_key(request)
    }

    /// Returns the number of answered requests.
    #[must_use]
    pub fn len(&self) -> usize { self.outcomes.len() }

    /// Returns `true` if no request has been answered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.outcomes.is_empty() }

    /// Iterates over every request and its outcome in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&R, &Outcome<R>)> {
        self.outcomes.iter()
    }

    /// Merges `other` into `self`. Requests already present in `self` keep
    /// their outcome.
    pub fn merge(&mut self, other: Self) {
        for (request, outcome) in other.outcomes {
            self.insert(request, outcome);
        }
    }

    /// Returns the part of this map that concerns the given batches.
    ///
    /// This is the slice handed back to one submitter after a tick answered
    /// the union of every drained submission.
    #[must_use]
    pub fn restrict(&self, batches: &[Batch<R>]) -> Self {
        let mut slice = Self::new();

        for request in flatten(batches) {
            if let Some(outcome) = self.outcomes.get(request) {
                slice.insert(request.clone(), outcome.clone());
            }
        }

        slice
    }

    /// Records `error` for every request of `batches` that has no outcome
    /// yet.
    pub fn fail_missing(&mut self, batches: &[Batch<R>], error: &R::Error) {
        for request in flatten(batches) {
            if !self.outcomes.contains_key(request) {
                self.outcomes.insert(request.clone(), Err(error.clone()));
            }
        }
    }

    /// Returns the requests of `batches` that have no outcome.
    #[must_use]
    pub fn missing<'a>(&self, batches: &'a [Batch<R>]) -> Vec<&'a R> {
        flatten(batches)
            .filter(|request| !self.outcomes.contains_key(*request))
            .collect()
    }
}

impl<R: Request> FromIterator<(R, Outcome<R>)> for CompletionMap<R> {
    fn from_iter<T: IntoIterator<Item = (R, Outcome<R>)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (request, outcome) in iter {
            map.insert(request, outcome);
        }
        map
    }
}

impl<R: Request> IntoIterator for CompletionMap<R> {
    type Item = (R, Outcome<R>);
    type IntoIter = std::collections::hash_map::IntoIter<R, Outcome<R>>;

    fn into_iter(self) -> Self::IntoIter { self.outcomes.into_iter() }
}

#[cfg(test)]
mod test;
