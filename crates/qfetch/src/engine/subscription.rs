use std::{pin::pin, sync::Arc};

use futures::{
    FutureExt, Stream, StreamExt,
    future::{BoxFuture, OptionFuture},
};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    engine::Context,
    query::{Outcome, Query, QueryResult},
};

type State<Q> = QueryResult<<Q as Query>::Value, <Q as Query>::Error>;

/// A live subscription to one query.
///
/// The subscription owns a driver task that executes the query whenever its
/// dependency changes and publishes the resulting [`QueryResult`]. A
/// dependency change while an execution is in flight abandons that execution
/// in favour of the new one, so a stale outcome is never published.
///
/// Dropping the subscription aborts the driver. An in-flight execution is
/// abandoned: its fetches may still be answered by a tick, but the outcome is
/// discarded.
#[derive(Debug)]
pub struct QuerySubscription<Q: Query> {
    state: watch::Receiver<State<Q>>,
    dependency: Arc<watch::Sender<Q>>,
    driver: JoinHandle<()>,
    bridge: Option<JoinHandle<()>>,
}

impl<Q: Query> QuerySubscription<Q> {
    pub(super) fn spawn<E: Send + Sync + 'static>(
        context: Context<E>,
        query: Q,
        hydrated: Option<Outcome<Q>>,
    ) -> Self {
        let fresh = hydrated.is_none();
        let initial = hydrated.map_or(QueryResult::Loading, QueryResult::Done);

        let (state_sender, state) = watch::channel(initial);
        let (dependency, dependency_receiver) = watch::channel(query);

        let driver = tokio::spawn(drive(
            context,
            dependency_receiver,
            state_sender,
            fresh,
        ));

        Self { state, dependency: Arc::new(dependency), driver, bridge: None }
    }

    /// The current state of the subscription.
    #[must_use]
    pub fn state(&self) -> State<Q> { self.state.borrow().clone() }

    /// Waits for the next state change and returns the new state.
    ///
    /// Returns `None` once the driver has stopped.
    pub async fn changed(&mut self) -> Option<State<Q>> {
        self.state.changed().await.ok()?;

        Some(self.state.borrow_and_update().clone())
    }

    /// Waits until no execution is running and returns the latest outcome.
    ///
    /// Returns immediately if the subscription is already settled, and `None`
    /// if the driver stopped first.
    pub async fn settled(&mut self) -> Option<Outcome<Q>> {
        let state = self.state.wait_for(QueryResult::is_settled).await.ok()?;

        state.current().cloned()
    }

    /// The query the subscription currently follows.
    #[must_use]
    pub fn dependency(&self) -> Q { self.dependency.borrow().clone() }

    /// Replaces the dependency.
    ///
    /// Returns `false`, and issues no work, if `query` equals the current
    /// dependency.
    pub fn set_dependency(&self, query: Q) -> bool {
        replace_if_changed(&self.dependency, query)
    }

    /// Follows every query yielded by `dependencies`, replacing the
    /// previously followed stream if any.
    pub fn follow<S>(&mut self, dependencies: S)
    where
        S: Stream<Item = Q> + Send + 'static,
    {
        let dependency = self.dependency.clone();

        let bridge = tokio::spawn(async move {
            let mut dependencies = pin!(dependencies);

            while let Some(query) = dependencies.next().await {
                replace_if_changed(&dependency, query);
            }
        });

        if let Some(previous) = self.bridge.replace(bridge) {
            previous.abort();
        }
    }

    /// A receiver observing every state change of the subscription.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<State<Q>> { self.state.clone() }

    /// Cancels the subscription.
    pub fn cancel(self) {}
}

impl<Q: Query> Drop for QuerySubscription<Q> {
    fn drop(&mut self) {
        self.driver.abort();

        if let Some(bridge) = self.bridge.take() {
            bridge.abort();
        }
    }
}

fn replace_if_changed<Q: Query>(
    dependency: &watch::Sender<Q>,
    query: Q,
) -> bool {
    dependency.send_if_modified(|current| {
        if *current == query {
            return false;
        }

        *current = query;
        true
    })
}

fn execute<Q: Query, E: Send + Sync + 'static>(
    context: &Context<E>,
    query: Q,
) -> BoxFuture<'static, Outcome<Q>> {
    let context = context.clone();

    async move { context.query(&query).await }.boxed()
}

#[tracing::instrument(
    skip_all,
    fields(query = std::any::type_name::<Q>()),
    level = "debug"
)]
async fn drive<Q: Query, E: Send + Sync + 'static>(
    context: Context<E>,
    mut dependency: watch::Receiver<Q>,
    state: watch::Sender<State<Q>>,
    fresh: bool,
) {
    let query = dependency.borrow_and_update().clone();
    let mut in_flight = fresh.then(|| execute(&context, query));

    loop {
        tokio::select! {
            biased;

            changed = dependency.changed() => {
                if changed.is_err() {
                    break;
                }

                let query = dependency.borrow_and_update().clone();
                tracing::trace!(?query, "dependency changed");

                state.send_modify(|current| {
                    *current = std::mem::take(current).begin();
                });

                // replacing the future drops the stale execution
                in_flight = Some(execute(&context, query));
            }

            Some(outcome) = OptionFuture::from(in_flight.as_mut()) => {
                in_flight = None;

                state.send_modify(|current| {
                    *current = std::mem::take(current).complete(outcome);
                });
            }
        }
    }

    if let Some(execution) = in_flight {
        let outcome = execution.await;

        state.send_modify(|current| {
            *current = std::mem::take(current).complete(outcome);
        });
    }
}
