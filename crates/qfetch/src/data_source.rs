//! The batching data source.
//!
//! A [`DataSource`] wraps a [`Fetch`] implementation, the function that does
//! the real work (network calls, database lookups) for an arbitrary set of
//! requests. Callers never invoke the fetch directly: they
//! [`submit`](DataSource::submit) batches, which are queued and answered by
//! the next [`tick`](DataSource::tick). Every submission made between two
//! ticks is answered by the same tick, which is how independent callers end
//! up sharing a single round-trip.
//!
//! # Fetch contract
//!
//! The wrapped fetch must answer every request it is given, placing a
//! per-request `Ok` or `Err` into the returned [`CompletionMap`]. A request
//! that is left out of the map is a contract violation of the fetch, not of
//! the data source: the violation is logged and the caller waiting on that
//! request never resumes.
//!
//! A fetch that fails as a whole (returns `Err`) does not violate the
//! contract; its error is recorded for every request it was asked to answer.
//! When the union of several submissions fails that way, every submission is
//! answered again on its own, so the error only reaches the submissions whose
//! own answer fails.
//!
//! Stopping the ticker mid-answer does not lose work: the submissions of the
//! cancelled tick go back into the queue and are answered by the next tick.

use std::{
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll},
};

use futures::future::BoxFuture;
use fxhash::FxHashSet;
use parking_lot::Mutex;
use tokio::{
    sync::{Notify, oneshot},
    task::JoinSet,
};

use crate::{
    completion::{CompletionMap, Outcome},
    config::{Coalesce, DataSourceConfig},
    request::{Batch, Request},
    ticker::{Tick, TickReport},
};

/// The function that answers batches of requests.
pub trait Fetch<R: Request>: Send + Sync + 'static {
    /// Answers every request of every batch.
    ///
    /// Failures of individual requests should be recorded in the returned map
    /// so they stay isolated from their siblings. Returning `Err` fails every
    /// request of `batches` with that error.
    fn answer(
        &self,
        batches: &[Batch<R>],
    ) -> impl Future<Output = Result<CompletionMap<R>, R::Error>> + Send;
}

/// A [`Fetch`] backed by a closure, created with [`fetch_fn`].
#[derive(Debug, Clone, Copy)]
pub struct FetchFn<F>(F);

/// Wraps a closure taking the batches to answer into a [`Fetch`].
pub const fn fetch_fn<F>(f: F) -> FetchFn<F> { FetchFn(f) }

impl<R, F, Fut> Fetch<R> for FetchFn<F>
where
    R: Request,
    F: Fn(Vec<Batch<R>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CompletionMap<R>, R::Error>> + Send,
{
    fn answer(
        &self,
        batches: &[Batch<R>],
    ) -> impl Future<Output = Result<CompletionMap<R>, R::Error>> + Send {
        (self.0)(batches.to_vec())
    }
}

/// Error returned by a [`Submission`] whose entry was dropped before any tick
/// answered it: the data source was dropped, or the tick answering it
/// panicked.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    thiserror::Error,
)]
#[error("the submission was dropped before it was answered")]
pub struct Interrupted;

/// The pending result of [`DataSource::submit`].
///
/// Resolves exactly once, with the completion map restricted to the
/// submitted requests, when a tick drains the submission.
#[derive(Debug)]
#[must_use = "a submission does nothing unless awaited"]
pub struct Submission<R: Request> {
    receiver: oneshot::Receiver<CompletionMap<R>>,
}

impl<R: Request> Future for Submission<R> {
    type Output = Result<CompletionMap<R>, Interrupted>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| Interrupted))
    }
}

struct Pending<R: Request> {
    batches: Vec<Batch<R>>,
    resolve: oneshot::Sender<CompletionMap<R>>,
}

struct Queue<R: Request> {
    pending: Mutex<Vec<Pending<R>>>,
    wakers: Mutex<Vec<Weak<Notify>>>,
}

impl<R: Request> Queue<R> {
    fn push(&self, pending: Pending<R>) {
        self.pending.lock().push(pending);
        self.wake_tickers();
    }

    fn drain(self: &Arc<Self>) -> Drained<R> {
        Drained {
            queue: self.clone(),
            pending: std::mem::take(&mut *self.pending.lock()),
        }
    }

    /// Puts submissions back at the front of the queue, ahead of anything
    /// submitted since they were drained.
    fn requeue(&self, requeued: Vec<Pending<R>>) {
        self.pending.lock().splice(0..0, requeued);
        self.wake_tickers();
    }

    fn wake_tickers(&self) {
        self.wakers.lock().retain(|waker| {
            waker.upgrade().is_some_and(|waker| {
                waker.notify_one();
                true
            })
        });
    }
}

/// Submissions taken out of the queue by a tick.
///
/// If the tick is cancelled before answering them (the ticker was stopped
/// mid-answer), the submissions still awaited go back into the queue so the
/// next ticker answers them. A tick that unwinds from a panic drops them
/// instead, interrupting their callers.
struct Drained<R: Request> {
    queue: Arc<Queue<R>>,
    pending: Vec<Pending<R>>,
}

impl<R: Request> Drained<R> {
    fn take(&mut self) -> Vec<Pending<R>> {
        std::mem::take(&mut self.pending)
    }

    fn split(mut self) -> Vec<Self> {
        let queue = self.queue.clone();

        self.take()
            .into_iter()
            .map(|pending| Self {
                queue: queue.clone(),
                pending: vec![pending],
            })
            .collect()
    }
}

impl<R: Request> Drop for Drained<R> {
    fn drop(&mut self) {
        if self.pending.is_empty() || std::thread::panicking() {
            return;
        }

        let requeued = self
            .take()
            .into_iter()
            .filter(|pending| !pending.resolve.is_closed())
            .collect::<Vec<_>>();

        if !requeued.is_empty() {
            tracing::debug!(
                submissions = requeued.len(),
                "tick cancelled before answering; requeueing"
            );
            self.queue.requeue(requeued);
        }
    }
}

/// Wraps a [`Fetch`] and coalesces concurrently submitted batches into ticks.
///
/// The queue is the only mutable state and it is touched exclusively through
/// an enqueue in [`submit`](Self::submit) and a take-all in
/// [`tick`](Self::tick). A submission made while a tick is answering lands in
/// a fresh queue and is answered by the next tick.
pub struct DataSource<R: Request, F> {
    name: Arc<str>,
    fetch: Arc<F>,
    queue: Arc<Queue<R>>,
    config: DataSourceConfig,
}

impl<R: Request, F> std::fmt::Debug for DataSource<R, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("name", &self.name)
            .field("pending", &self.queue.pending.lock().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<R: Request, F: Fetch<R>> DataSource<R, F> {
    /// Creates a data source with the default configuration.
    pub fn new(name: impl Into<Arc<str>>, fetch: F) -> Self {
        Self::with_config(name, fetch, DataSourceConfig::default())
    }

    /// Creates a data source with the given configuration.
    pub fn with_config(
        name: impl Into<Arc<str>>,
        fetch: F,
        config: DataSourceConfig,
    ) -> Self {
        Self {
            name: name.into(),
            fetch: Arc::new(fetch),
            queue: Arc::new(Queue {
                pending: Mutex::new(Vec::new()),
                wakers: Mutex::new(Vec::new()),
            }),
            config,
        }
    }

    /// The name used to identify this data source in logs.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// The configuration this data source was created with.
    #[must_use]
    pub const fn config(&self) -> &DataSourceConfig { &self.config }

    /// Returns the number of submissions waiting for the next tick.
    #[must_use]
    pub fn pending(&self) -> usize { self.queue.pending.lock().len() }

    /// Enqueues `batches` for the next tick and returns immediately.
    pub fn submit(&self, batches: Vec<Batch<R>>) -> Submission<R> {
        let (resolve, receiver) = oneshot::channel();

        self.queue.push(Pending { batches, resolve });

        Submission { receiver }
    }

    /// Fetches a single request through the next tick.
    ///
    /// Never resumes if the wrapped fetch leaves the request unanswered.
    pub async fn fetch(&self, request: R) -> Outcome<R> {
        let completed = self.submit(vec![Batch::single(request.clone())]).await;

        match completed {
            Ok(map) => match map.get(&request) {
                Some(outcome) => outcome.clone(),
                None => self.never_resume(&request).await,
            },
            Err(Interrupted) => self.never_resume(&request).await,
        }
    }

    /// Fetches `requests` as one batch and returns their outcomes in the same
    /// order.
    ///
    /// Never resumes if the wrapped fetch leaves any request unanswered.
    pub async fn fetch_all(&self, requests: Vec<R>) -> Vec<Outcome<R>> {
        let completed = self.submit(vec![Batch::new(requests.clone())]).await;

        let map = match completed {
            Ok(map) => map,
            Err(Interrupted) => match requests.first() {
                Some(request) => self.never_resume(request).await,
                None => return Vec::new(),
            },
        };

        let mut outcomes = Vec::with_capacity(requests.len());
        for request in &requests {
            match map.get(request) {
                Some(outcome) => outcomes.push(outcome.clone()),
                None => self.never_resume(request).await,
            }
        }

        outcomes
    }

    /// Drains the whole queue and answers every drained submission.
    ///
    /// A tick on an empty queue returns immediately.
    #[tracing::instrument(
        skip(self),
        fields(source = %self.name),
        level = "debug"
    )]
    pub async fn tick(&self) -> TickReport {
        let drained = self.queue.drain();

        if drained.pending.is_empty() {
            return TickReport::default();
        }

        let report = match self.config.coalesce {
            Coalesce::Union => self.answer_union(drained).await,
            Coalesce::PerSubmission => self.answer_each(drained).await,
        };

        tracing::debug!(
            submissions = report.submissions,
            requests = report.requests,
            invocations = report.invocations,
            "tick answered"
        );

        report
    }

    async fn answer_union(&self, mut drained: Drained<R>) -> TickReport {
        let union = self.prepare(
            drained
                .pending
                .iter()
                .flat_map(|pending| pending.batches.iter().cloned()),
        );
        let submissions = drained.pending.len();
        let requests = union.iter().map(Batch::len).sum();

        if union.is_empty() {
            resolve(drained.take(), &CompletionMap::new());
            return TickReport { submissions, requests, invocations: 0 };
        }

        match attempt(self.fetch.as_ref(), &self.name, &union).await {
            Ok(map) => {
                resolve(drained.take(), &map);
                TickReport { submissions, requests, invocations: 1 }
            }

            Err(error) if submissions == 1 => {
                let mut map = CompletionMap::new();
                map.fail_missing(&union, &error);
                resolve(drained.take(), &map);
                TickReport { submissions, requests, invocations: 1 }
            }

            // one submission may have failed the whole union; answer each on
            // its own so the others are not failed along with it
            Err(error) => {
                tracing::debug!(
                    source = %self.name,
                    ?error,
                    submissions,
                    "fetch failed as a whole; answering submissions separately"
                );

                let separate = self.answer_each(drained).await;
                TickReport {
                    submissions,
                    requests: requests + separate.requests,
                    invocations: 1 + separate.invocations,
                }
            }
        }
    }

    async fn answer_each(&self, drained: Drained<R>) -> TickReport {
        let mut report = TickReport {
            submissions: drained.pending.len(),
            ..TickReport::default()
        };
        let mut forks = JoinSet::new();

        for mut single in drained.split() {
            let unique = self.prepare(
                single
                    .pending
                    .iter()
                    .flat_map(|pending| pending.batches.iter().cloned()),
            );

            if unique.is_empty() {
                resolve(single.take(), &CompletionMap::new());
                continue;
            }

            report.requests += unique.iter().map(Batch::len).sum::<usize>();
            report.invocations += 1;

            let fetch = self.fetch.clone();
            let name = self.name.clone();

            forks.spawn(async move {
                let map = answer(fetch.as_ref(), &name, &unique).await;
                resolve(single.take(), &map);
            });
        }

        while let Some(joined) = forks.join_next().await {
            if let Err(error) = joined {
                tracing::error!(
                    source = %self.name,
                    %error,
                    "answer task failed; its submitter will never resume"
                );
            }
        }

        report
    }

    /// Drops empty batches and, when configured, requests already seen in an
    /// earlier batch.
    fn prepare(
        &self,
        batches: impl Iterator<Item = Batch<R>>,
    ) -> Vec<Batch<R>> {
        let non_empty = batches.filter(|batch| !batch.is_empty());

        if !self.config.deduplicate {
            return non_empty.collect();
        }

        let mut seen = FxHashSet::default();
        non_empty
            .map(|batch| {
                batch
                    .into_iter()
                    .filter(|request| seen.insert(request.clone()))
                    .collect::<Batch<R>>()
            })
            .filter(|batch| !batch.is_empty())
            .collect()
    }

    async fn never_resume(&self, request: &R) -> ! {
        tracing::error!(
            source = %self.name,
            ?request,
            "fetch did not answer the request; the caller will never resume"
        );

        futures::future::pending().await
    }
}

fn resolve<R: Request>(pending: Vec<Pending<R>>, map: &CompletionMap<R>) {
    for Pending { batches, resolve } in pending {
        // the receiver is gone when the caller was cancelled
        let _ = resolve.send(map.restrict(&batches));
    }
}

/// Invokes the fetch and reports requests it left unanswered.
async fn attempt<R: Request, F: Fetch<R>>(
    fetch: &F,
    name: &str,
    batches: &[Batch<R>],
) -> Result<CompletionMap<R>, R::Error> {
    let map = fetch.answer(batches).await?;

    let missing = map.missing(batches);
    if !missing.is_empty() {
        tracing::error!(
            source = name,
            ?missing,
            "fetch broke its contract by leaving requests unanswered"
        );
    }

    Ok(map)
}

async fn answer<R: Request, F: Fetch<R>>(
    fetch: &F,
    name: &str,
    batches: &[Batch<R>],
) -> CompletionMap<R> {
    match attempt(fetch, name, batches).await {
        Ok(map) => map,
        Err(error) => {
            tracing::debug!(source = name, ?error, "fetch failed as a whole");

            let mut map = CompletionMap::new();
            map.fail_missing(batches, &error);
            map
        }
    }
}

impl<R: Request, F: Fetch<R>> Tick for DataSource<R, F> {
    fn name(&self) -> &str { &self.name }

    fn tick(&self) -> BoxFuture<'_, TickReport> { Box::pin(Self::tick(self)) }

    fn attach(&self, waker: &Arc<Notify>) {
        self.queue.wakers.lock().push(Arc::downgrade(waker));
    }
}
