//! The cooperative scheduling loop that flushes data sources.
//!
//! A [`Ticker`] owns a set of registered sources. Each round forks the tick of
//! every source, waits for all of them, then yields once. Submissions made
//! while a round is in flight are picked up by the next round, so everything
//! submitted within one scheduling pass is answered together.
//!
//! The ticker performs no retry, backoff, or ordering across sources.

use std::{convert::Infallible, sync::Arc};

use futures::future::BoxFuture;
use tokio::{
    sync::Notify,
    task::{JoinHandle, JoinSet},
};

use crate::config::TickerConfig;

/// Summary of what one tick of a source did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TickReport {
    /// The number of submissions drained from the queue.
    pub submissions: usize,

    /// The number of requests handed to the wrapped fetch, after
    /// deduplication.
    pub requests: usize,

    /// The number of times the wrapped fetch was invoked.
    pub invocations: usize,
}

impl TickReport {
    /// Returns `true` if the tick found nothing to do.
    #[must_use]
    pub const fn is_idle(&self) -> bool { self.submissions == 0 }
}

/// A source that can be flushed by a [`Ticker`].
///
/// Implemented by every [`DataSource`](crate::data_source::DataSource); the
/// trait exists so that sources with different request families can be
/// registered with the same ticker.
pub trait Tick: Send + Sync + 'static {
    /// The name used to identify the source in logs.
    fn name(&self) -> &str;

    /// Drains and answers the source's queue.
    fn tick(&self) -> BoxFuture<'_, TickReport>;

    /// Registers a waker notified whenever the source receives a submission.
    ///
    /// Only a weak reference is kept, so a stopped ticker is forgotten.
    fn attach(&self, waker: &Arc<Notify>);
}

/// Repeatedly ticks every registered source.
pub struct Ticker {
    sources: Vec<Arc<dyn Tick>>,
    waker: Arc<Notify>,
    config: TickerConfig,
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Ticker {
    fn default() -> Self { Self::new() }
}

impl Ticker {
    /// Creates a ticker with no sources and the default configuration.
    #[must_use]
    pub fn new() -> Self { Self::with_config(TickerConfig::default()) }

    /// Creates a ticker with no sources.
    #[must_use]
    pub fn with_config(config: TickerConfig) -> Self {
        Self { sources: Vec::new(), waker: Arc::new(Notify::new()), config }
    }

    /// Adds a source to be ticked every round.
    pub fn register(&mut self, source: Arc<dyn Tick>) {
        source.attach(&self.waker);
        self.sources.push(source);
    }

    /// Returns the number of registered sources.
    #[must_use]
    pub fn source_count(&self) -> usize { self.sources.len() }

    /// Runs a single round: forks the tick of every source, waits for all of
    /// them to finish, then yields control once.
    ///
    /// Returns the combined report of the round.
    pub async fn round(&self) -> TickReport {
        let mut forks = JoinSet::new();

        for source in &self.sources {
            let source = source.clone();
            forks.spawn(async move { source.tick().await });
        }

        let mut total = TickReport::default();
        while let Some(joined) = forks.join_next().await {
            match joined {
                Ok(report) => {
                    total.submissions += report.submissions;
                    total.requests += report.requests;
                    total.invocations += report.invocations;
                }
                Err(error) => {
                    tracing::error!(%error, "a source tick failed");
                }
            }
        }

        tokio::task::yield_now().await;

        total
    }

    /// Runs rounds forever.
    pub async fn run(self) -> Infallible {
        loop {
            let report = self.round().await;

            if report.is_idle() && self.config.park_when_idle {
                // a submission made since the round stored a permit, so this
                // returns immediately instead of losing the wake-up
                self.waker.notified().await;
            }
        }
    }

    /// Spawns [`run`](Self::run) onto the current tokio runtime.
    #[must_use = "dropping the handle stops the ticker"]
    pub fn spawn(self) -> TickerHandle {
        tracing::debug!(sources = self.sources.len(), "ticker started");

        TickerHandle { task: tokio::spawn(self.run()) }
    }
}

/// Owns a spawned [`Ticker`]. Dropping the handle stops the ticker.
#[derive(Debug)]
pub struct TickerHandle {
    task: JoinHandle<Infallible>,
}

impl TickerHandle {
    /// Stops the ticker. In-flight ticks are aborted and the submissions they
    /// were answering return to their sources' queues.
    pub fn stop(self) {}

    /// Returns `true` if the ticker task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool { self.task.is_finished() }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!("ticker stopped");
    }
}
