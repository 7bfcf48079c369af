#![allow(missing_docs)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::join_all;
use qfetch::{
    Batch, Coalesce, CompletionMap, DataSource, DataSourceConfig, Fetch,
    Request, Ticker,
};

/// Looks up the square of a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lookup(pub u64);

impl Request for Lookup {
    type Value = u64;
    type Error = ();
}

/// A backend whose every invocation costs one simulated round-trip.
#[derive(Debug, Clone, Default)]
pub struct RoundTrip {
    latency: Duration,
    round_trips: Arc<AtomicUsize>,
}

impl RoundTrip {
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self { latency, round_trips: Arc::default() }
    }

    #[must_use]
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::Relaxed)
    }
}

impl Fetch<Lookup> for RoundTrip {
    async fn answer(
        &self,
        batches: &[Batch<Lookup>],
    ) -> Result<CompletionMap<Lookup>, ()> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;

        Ok(batches
            .iter()
            .flatten()
            .map(|lookup| (*lookup, Ok(lookup.0 * lookup.0)))
            .collect())
    }
}

pub type LookupSource = DataSource<Lookup, RoundTrip>;

#[must_use]
pub fn create_source(
    coalesce: Coalesce,
    backend: RoundTrip,
) -> Arc<LookupSource> {
    let config = DataSourceConfig::builder().coalesce(coalesce).build();

    Arc::new(DataSource::with_config("lookups", backend, config))
}

/// Issues `callers` independent fetches against a ticking `source` and sums
/// the answers.
pub async fn fetch_concurrently(
    source: Arc<LookupSource>,
    callers: u64,
) -> u64 {
    let mut ticker = Ticker::new();
    ticker.register(source.clone());
    let _ticker = ticker.spawn();

    let callers = (0..callers).map(|i| {
        let source = source.clone();
        tokio::spawn(async move { source.fetch(Lookup(i)).await })
    });

    join_all(callers)
        .await
        .into_iter()
        .filter_map(|joined| joined.ok().and_then(Result::ok))
        .sum()
}
