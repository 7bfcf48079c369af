//! Defines the [`Executor`] trait for executing queries, and the registry that
//! maps each query type to its executor and optional cache codec.

use std::{
    any::{Any, TypeId},
    marker::PhantomData,
    sync::Arc,
};

use futures::future::BoxFuture;
use fxhash::FxHashMap;

use crate::{
    cache::Codec,
    engine::Context,
    query::{Outcome, Query},
};

/// Representing the executor of a [`Query`].
///
/// The executor defines how the outcome of a query is computed, usually by
/// fetching requests through data sources reachable from the environment
/// `E`, or by composing other queries through the [`Context`].
///
/// Failures are returned as values; an executor never needs to panic to
/// report a failed fetch.
pub trait Executor<Q: Query, E>: 'static + Send + Sync {
    /// Execute the given query using the provided context.
    fn execute<'s, 'q, 'c>(
        &'s self,
        query: &'q Q,
        context: &'c Context<E>,
    ) -> impl Future<Output = Outcome<Q>> + Send + use<'s, 'q, 'c, Self, Q, E>;
}

/// Object-safe form of [`Executor`].
pub(crate) trait DynExecutor<Q: Query, E>: 'static + Send + Sync {
    fn execute<'a>(
        &'a self,
        query: &'a Q,
        context: &'a Context<E>,
    ) -> BoxFuture<'a, Outcome<Q>>;
}

impl<Q: Query, E, X: Executor<Q, E>> DynExecutor<Q, E> for X {
    fn execute<'a>(
        &'a self,
        query: &'a Q,
        context: &'a Context<E>,
    ) -> BoxFuture<'a, Outcome<Q>> {
        Box::pin(Executor::execute(self, query, context))
    }
}

/// What the registry knows about one query type.
pub(crate) struct Entry<Q: Query, E> {
    executor: Arc<dyn DynExecutor<Q, E>>,
    codec: Option<Arc<dyn Codec<Q>>>,
}

impl<Q: Query, E> Clone for Entry<Q, E> {
    fn clone(&self) -> Self {
        Self { executor: self.executor.clone(), codec: self.codec.clone() }
    }
}

impl<Q: Query, E> Entry<Q, E> {
    pub(crate) fn executor(&self) -> &dyn DynExecutor<Q, E> {
        self.executor.as_ref()
    }

    pub(crate) fn codec(&self) -> Option<&dyn Codec<Q>> {
        self.codec.as_deref()
    }
}

/// Contains the [`Executor`] and optional [`Codec`] for each query type.
///
/// The registry is written while the engine is being set up and only read
/// afterwards, so it needs no synchronisation of its own.
pub struct Registry<E> {
    entries: FxHashMap<TypeId, Box<dyn Any + Send + Sync>>,
    _environment: PhantomData<fn() -> E>,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self { entries: FxHashMap::default(), _environment: PhantomData }
    }
}

impl<E> std::fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("query_types", &self.entries.len())
            .finish()
    }
}

impl<E: 'static> Registry<E> {
    /// Registers an executor, and optionally a codec, for the query type `Q`.
    ///
    /// A later registration for the same query type replaces the earlier one.
    pub fn register<Q: Query, X: Executor<Q, E>>(
        &mut self,
        executor: Arc<X>,
        codec: Option<Arc<dyn Codec<Q>>>,
    ) {
        let entry: Entry<Q, E> = Entry { executor, codec };

        self.entries.insert(TypeId::of::<Q>(), Box::new(entry));
    }

    /// Returns `true` if the query type `Q` has an executor.
    #[must_use]
    pub fn contains<Q: Query>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<Q>())
    }

    /// Returns the number of registered query types.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Returns `true` if no query type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Retrieve the entry for the given query type.
    ///
    /// Querying a type without a registered executor is a setup bug, not a
    /// runtime condition, and panics.
    pub(crate) fn entry<Q: Query>(&self) -> &Entry<Q, E> {
        self.entries
            .get(&TypeId::of::<Q>())
            .and_then(|entry| entry.downcast_ref::<Entry<Q, E>>())
            .unwrap_or_else(|| {
                panic!(
                    "Failed to find executor for query name: {}",
                    std::any::type_name::<Q>()
                )
            })
    }
}
