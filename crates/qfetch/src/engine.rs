//! The engine: executor registry, hydrated snapshot, and the entry points for
//! subscribing to queries and running prefetch passes.
//!
//! # Architecture Overview
//!
//! ```text
//!   subscribe(query) ──► QuerySubscription ──► Context::query
//!                                                   │
//!                              Registry ◄───────────┤ executor + codec
//!                                                   ▼
//!                                    DataSource::fetch / fetch_all
//!                                                   │ submit
//!                                                   ▼
//!                 Ticker ──tick──► DataSource queue ──► Fetch::answer
//!                                                   │
//!                                     CompletionMap slices per submitter
//! ```
//!
//! # Lifecycle
//!
//! 1. **Create**: build an `Engine` around an explicit environment struct
//! 2. **Register**: add executors (optionally with a cache codec) and sources
//! 3. **Wrap**: convert to `Arc<Engine>` for shared ownership
//! 4. **Server**: run [`prefetch`](Engine::prefetch) and ship the snapshot text
//! 5. **Client**: [`hydrate`](Engine::hydrate) the snapshot, then
//!    [`mount`](Engine::mount) to start ticking
//! 6. **Query**: [`subscribe`](Engine::subscribe) to queries; drop the
//!    subscription to cancel it

use std::{fmt::Debug, sync::Arc};

use futures::Stream;

use crate::{
    cache::{CacheEntry, Codec, PrefetchCollector, Snapshot, SnapshotError},
    config::TickerConfig,
    executor::{Executor, Registry},
    query::{Outcome, Query},
    ticker::{Tick, Ticker, TickerHandle},
};

mod service;
mod subscription;

pub use service::{EffectHandle, ServiceContext};
pub use subscription::QuerySubscription;

/// The central query engine.
///
/// The environment `E` is an explicit dependency struct (data sources,
/// repositories, clients) handed to every executor through the [`Context`].
///
/// # Thread Safety
///
/// - `&mut Engine`: required for registration
/// - `Arc<Engine>`: the way the engine is shared once set up; hydration,
///   subscription, and prefetch only need `&self`
pub struct Engine<E> {
    environment: E,
    registry: Registry<E>,
    sources: Vec<Arc<dyn Tick>>,
    snapshot: Snapshot,
    ticker_config: TickerConfig,
}

static_assertions::assert_impl_all!(&Engine<()>: Send, Sync);
static_assertions::assert_impl_all!(Context<()>: Send, Sync, Clone);
static_assertions::assert_obj_safe!(Tick);

impl<E> Debug for Engine<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("snapshot_entries", &self.snapshot.len())
            .finish_non_exhaustive()
    }
}

impl<E: Send + Sync + 'static> Engine<E> {
    /// Creates an engine around the given environment.
    pub fn new(environment: E) -> Self {
        Self {
            environment,
            registry: Registry::default(),
            sources: Vec::new(),
            snapshot: Snapshot::new(),
            ticker_config: TickerConfig::default(),
        }
    }

    /// Sets the configuration of the tickers this engine spawns.
    #[must_use]
    pub fn with_ticker_config(mut self, config: TickerConfig) -> Self {
        self.ticker_config = config;
        self
    }

    /// Registers an executor for the given query type.
    ///
    /// Each query type should have exactly one executor registered. If an
    /// executor is already registered for the type, it will be replaced.
    pub fn register_executor<Q: Query, X: Executor<Q, E>>(
        &mut self,
        executor: Arc<X>,
    ) {
        self.registry.register::<Q, X>(executor, None);
    }

    /// Registers an executor whose outcomes are written to prefetch snapshots
    /// and read back on hydration through `codec`.
    pub fn register_cached<Q: Query, X: Executor<Q, E>, C: Codec<Q>>(
        &mut self,
        executor: Arc<X>,
        codec: C,
    ) {
        self.registry.register::<Q, X>(executor, Some(Arc::new(codec)));
    }

    /// Registers a source to be ticked by every ticker this engine spawns.
    pub fn register_source(&mut self, source: Arc<dyn Tick>) {
        self.sources.push(source);
    }

    /// The environment handed to executors.
    pub const fn env(&self) -> &E { &self.environment }

    /// The registered executors and codecs.
    pub const fn registry(&self) -> &Registry<E> { &self.registry }

    /// The unspent part of the hydrated snapshot.
    pub const fn snapshot(&self) -> &Snapshot { &self.snapshot }

    /// Loads snapshot text produced by a prefetch pass.
    ///
    /// Meant to be called once, before the first subscription. Returns the
    /// number of entries loaded; entries whose key is already present are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Malformed`] if `text` is not a JSON object.
    /// Individual malformed entries are skipped instead.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn hydrate(&self, text: &str) -> Result<usize, SnapshotError> {
        let snapshot = Snapshot::parse(text)?;

        Ok(self.hydrate_snapshot(&snapshot))
    }

    /// Loads the entries of an already parsed snapshot.
    pub fn hydrate_snapshot(&self, snapshot: &Snapshot) -> usize {
        let loaded = snapshot
            .entries()
            .into_iter()
            .filter(|entry| self.snapshot.insert(entry.clone()))
            .count();

        tracing::debug!(loaded, "snapshot hydrated");
        loaded
    }

    /// Builds a ticker over every registered source.
    #[must_use]
    pub fn ticker(&self) -> Ticker {
        let mut ticker = Ticker::with_config(self.ticker_config);
        for source in &self.sources {
            ticker.register(source.clone());
        }
        ticker
    }

    /// Returns a context for running queries outside a subscription.
    #[must_use]
    pub fn context(self: &Arc<Self>) -> Context<E> {
        Context { engine: self.clone(), prefetch: None }
    }

    /// Starts ticking the registered sources.
    ///
    /// The returned guard owns the ticker; dropping it tears the environment
    /// down again.
    #[must_use = "dropping the guard unmounts the engine"]
    pub fn mount(self: &Arc<Self>) -> Mounted<E> {
        tracing::debug!("engine mounted");

        Mounted { engine: self.clone(), ticker: self.ticker().spawn() }
    }

    /// Runs `pass` in prefetch mode and returns its output together with the
    /// snapshot text of every cached query it executed successfully.
    ///
    /// A ticker scoped to the pass flushes the registered sources.
    #[tracing::instrument(skip_all, level = "debug")]
    pub async fn prefetch<F, Fut, T>(self: &Arc<Self>, pass: F) -> (T, String)
    where
        F: FnOnce(Context<E>) -> Fut,
        Fut: Future<Output = T>,
    {
        let collector = Arc::new(PrefetchCollector::new());
        let context =
            Context { engine: self.clone(), prefetch: Some(collector.clone()) };

        let ticker = self.ticker().spawn();
        let output = pass(context).await;
        drop(ticker);

        tracing::debug!(collected = collector.len(), "prefetch finished");

        (output, collector.snapshot_text())
    }

    /// Like [`prefetch`](Self::prefetch), discarding the pass output.
    pub async fn collect_prefetch<F, Fut, T>(
        self: &Arc<Self>,
        pass: F,
    ) -> String
    where
        F: FnOnce(Context<E>) -> Fut,
        Fut: Future<Output = T>,
    {
        self.prefetch(pass).await.1
    }

    /// Subscribes to `query`.
    ///
    /// If the hydrated snapshot holds an entry for the query, the subscription
    /// starts in `Done` with the decoded outcome and the first execution is
    /// skipped; the entry is spent either way. Otherwise it starts in
    /// `Loading` and executes immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<Q: Query>(
        self: &Arc<Self>,
        query: Q,
    ) -> QuerySubscription<Q> {
        let hydrated = self.take_hydrated(&query);

        QuerySubscription::spawn(self.context(), query, hydrated)
    }

    /// Subscribes to `initial`, then follows every query yielded by
    /// `dependencies`, typically a [`Subscriber`](crate::hub::Subscriber) of a
    /// hub that UI events are published to.
    pub fn subscribe_to<Q, S>(
        self: &Arc<Self>,
        initial: Q,
        dependencies: S,
    ) -> QuerySubscription<Q>
    where
        Q: Query,
        S: Stream<Item = Q> + Send + 'static,
    {
        let mut subscription = self.subscribe(initial);
        subscription.follow(dependencies);
        subscription
    }

    fn take_hydrated<Q: Query>(&self, query: &Q) -> Option<Outcome<Q>> {
        let codec = self.registry.entry::<Q>().codec()?;

        if self.snapshot.is_empty() {
            return None;
        }

        // spend before decoding so concurrent subscribers cannot both use it
        let key = codec.key(query);
        let value = self.snapshot.spend(&key)?;

        let entry = Snapshot::from_entries([CacheEntry { key, value }]);
        codec.decode(query, &entry)
    }
}

/// The handle executors use to reach the environment and compose queries.
pub struct Context<E> {
    engine: Arc<Engine<E>>,
    prefetch: Option<Arc<PrefetchCollector>>,
}

impl<E> Clone for Context<E> {
    fn clone(&self) -> Self {
        Self { engine: self.engine.clone(), prefetch: self.prefetch.clone() }
    }
}

impl<E> Debug for Context<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("prefetching", &self.prefetch.is_some())
            .finish_non_exhaustive()
    }
}

impl<E: Send + Sync + 'static> Context<E> {
    /// The environment of the engine.
    #[must_use]
    pub fn env(&self) -> &E { &self.engine.environment }

    /// The engine this context belongs to.
    #[must_use]
    pub const fn engine(&self) -> &Arc<Engine<E>> { &self.engine }

    /// Returns `true` if this context runs on behalf of a prefetch pass.
    #[must_use]
    pub const fn is_prefetching(&self) -> bool { self.prefetch.is_some() }

    /// Executes `query` with its registered executor.
    ///
    /// During a prefetch pass a successful outcome of a cached query is also
    /// written to the pass's snapshot.
    ///
    /// # Panics
    ///
    /// Panics if no executor is registered for `Q`.
    pub async fn query<Q: Query>(&self, query: &Q) -> Outcome<Q> {
        let entry = self.engine.registry.entry::<Q>();
        let outcome = entry.executor().execute(query, self).await;

        if let Some(collector) = &self.prefetch
            && let Some(codec) = entry.codec()
            && let Some(cache_entry) = codec.encode(query, &outcome)
        {
            collector.record(cache_entry);
        }

        outcome
    }
}

/// A mounted engine: the registered sources are being ticked.
///
/// Dropping the guard stops the ticker.
#[derive(Debug)]
pub struct Mounted<E> {
    engine: Arc<Engine<E>>,
    ticker: TickerHandle,
}

impl<E: Send + Sync + 'static> Mounted<E> {
    /// The mounted engine.
    #[must_use]
    pub const fn engine(&self) -> &Arc<Engine<E>> { &self.engine }

    /// A service context for running effects against the mounted engine.
    #[must_use]
    pub fn service_context(&self) -> ServiceContext<E> {
        ServiceContext::provided(self.engine.clone())
    }

    /// Subscribes to `query`; see [`Engine::subscribe`].
    pub fn subscribe<Q: Query>(&self, query: Q) -> QuerySubscription<Q> {
        self.engine.subscribe(query)
    }

    /// Stops the ticker.
    pub fn unmount(self) {}
}

impl<E> Drop for Mounted<E> {
    fn drop(&mut self) {
        tracing::debug!(
            ticker_finished = self.ticker.is_finished(),
            "engine unmounted"
        );
    }
}

#[cfg(test)]
mod test;
