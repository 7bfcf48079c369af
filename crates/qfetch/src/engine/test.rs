use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    cache::SuccessCodec,
    completion::CompletionMap,
    data_source::{DataSource, Fetch},
    engine::{Context, Engine, ServiceContext},
    executor::Executor,
    query::{Query, QueryResult},
    request::{Batch, Request},
    ticker::Ticker,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Number(u32);

impl Request for Number {
    type Value = u32;
    type Error = &'static str;
}

/// Doubles every number except zero, which fails.
#[derive(Debug, Clone, Default)]
pub struct Doubling {
    invocations: Arc<AtomicUsize>,
}

impl Fetch<Number> for Doubling {
    async fn answer(
        &self,
        batches: &[Batch<Number>],
    ) -> Result<CompletionMap<Number>, &'static str> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let mut map = CompletionMap::new();
        for Number(n) in crate::request::flatten(batches).copied() {
            if n == 0 {
                map.fail(Number(n), "zero");
            } else {
                map.succeed(Number(n), n * 2);
            }
        }

        Ok(map)
    }
}

pub struct Env {
    source: Arc<DataSource<Number, Doubling>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Double(u32);

impl Query for Double {
    type Value = u32;
    type Error = String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quadruple(u32);

impl Query for Quadruple {
    type Value = u32;
    type Error = String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Unregistered;

impl Query for Unregistered {
    type Value = ();
    type Error = String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct DoubleExecutor;

impl Executor<Double, Env> for DoubleExecutor {
    async fn execute(
        &self,
        query: &Double,
        context: &Context<Env>,
    ) -> Result<u32, String> {
        context
            .env()
            .source
            .fetch(Number(query.0))
            .await
            .map_err(str::to_owned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct QuadrupleExecutor;

impl Executor<Quadruple, Env> for QuadrupleExecutor {
    async fn execute(
        &self,
        query: &Quadruple,
        context: &Context<Env>,
    ) -> Result<u32, String> {
        let double = context.query(&Double(query.0)).await?;

        context.query(&Double(double)).await
    }
}

fn engine() -> (Arc<Engine<Env>>, Arc<AtomicUsize>) {
    let fetch = Doubling::default();
    let invocations = fetch.invocations.clone();
    let source = Arc::new(DataSource::new("numbers", fetch));

    let mut engine = Engine::new(Env { source: source.clone() });
    engine.register_source(source);
    engine.register_cached::<Double, _, _>(
        Arc::new(DoubleExecutor),
        SuccessCodec::new(|query: &Double| format!("double({})", query.0)),
    );
    engine.register_executor::<Quadruple, _>(Arc::new(QuadrupleExecutor));

    (Arc::new(engine), invocations)
}

/// Waits until a submission is queued, then runs one round.
async fn flush(engine: &Engine<Env>, ticker: &Ticker) {
    while engine.env().source.pending() == 0 {
        tokio::task::yield_now().await;
    }

    ticker.round().await;
}

#[tokio::test]
async fn context_composes_queries() {
    let (engine, invocations) = engine();
    let _mounted = engine.mount();

    assert_eq!(engine.context().query(&Quadruple(3)).await, Ok(12));
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failures_are_values() {
    let (engine, _) = engine();
    let _mounted = engine.mount();

    assert_eq!(
        engine.context().query(&Quadruple(0)).await,
        Err("zero".to_owned())
    );
}

#[tokio::test]
async fn subscription_loads_then_refreshes() {
    let (engine, _) = engine();
    let ticker = engine.ticker();

    let mut subscription = engine.subscribe(Double(1));
    assert_eq!(subscription.state(), QueryResult::Loading);

    flush(&engine, &ticker).await;
    assert_eq!(subscription.settled().await, Some(Ok(2)));

    assert!(subscription.set_dependency(Double(2)));
    assert_eq!(
        subscription.changed().await,
        Some(QueryResult::Refreshing(Ok(2)))
    );

    flush(&engine, &ticker).await;
    assert_eq!(subscription.settled().await, Some(Ok(4)));
    assert_eq!(subscription.dependency(), Double(2));
}

#[tokio::test]
async fn equal_dependency_issues_no_work() {
    let (engine, invocations) = engine();
    let _mounted = engine.mount();

    let mut subscription = engine.subscribe(Double(5));
    assert_eq!(subscription.settled().await, Some(Ok(10)));

    assert!(!subscription.set_dependency(Double(5)));
    assert_eq!(subscription.state(), QueryResult::Done(Ok(10)));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hydrated_subscription_skips_the_first_fetch() {
    let (engine, invocations) = engine();
    assert_eq!(engine.hydrate(r#"{"double(4)":"8"}"#).unwrap(), 1);

    let _mounted = engine.mount();
    let mut subscription = engine.subscribe(Double(4));

    assert_eq!(subscription.state(), QueryResult::Done(Ok(8)));
    assert_eq!(subscription.settled().await, Some(Ok(8)));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    assert!(engine.snapshot().is_empty());

    // the entry is spent, so a second subscription fetches
    let mut second = engine.subscribe(Double(4));
    assert_eq!(second.state(), QueryResult::Loading);
    assert_eq!(second.settled().await, Some(Ok(8)));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn incompatible_snapshot_entry_falls_back_to_a_fetch() {
    let (engine, invocations) = engine();
    engine.hydrate(r#"{"double(4)":"\"eight\""}"#).unwrap();

    let _mounted = engine.mount();
    let mut subscription = engine.subscribe(Double(4));

    assert_eq!(subscription.state(), QueryResult::Loading);
    assert_eq!(subscription.settled().await, Some(Ok(8)));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert!(engine.snapshot().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hydrated_entry_serves_one_of_many_concurrent_subscribers() {
    let (engine, _) = engine();
    engine.hydrate(r#"{"double(4)":"8"}"#).unwrap();

    let subscribers = (0..16)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.subscribe(Double(4)).state() })
        })
        .collect::<Vec<_>>();

    let mut hydrated = 0;
    for subscriber in subscribers {
        if subscriber.await.unwrap().is_done() {
            hydrated += 1;
        }
    }

    assert_eq!(hydrated, 1);
}

#[tokio::test]
async fn prefetch_collects_cached_successes() {
    let (engine, _) = engine();

    let (outcome, text) = engine
        .prefetch(|context| async move {
            assert!(context.is_prefetching());
            context.query(&Quadruple(1)).await
        })
        .await;

    assert_eq!(outcome, Ok(4));
    assert_eq!(text, r#"{"double(1)":"2","double(2)":"4"}"#);
}

#[tokio::test]
async fn prefetch_skips_failures() {
    let (engine, _) = engine();

    let text = engine
        .collect_prefetch(|context| async move {
            context.query(&Double(0)).await
        })
        .await;

    assert_eq!(text, "{}");
}

#[tokio::test]
#[should_panic(expected = "Failed to find executor")]
async fn querying_an_unregistered_type_panics() {
    let (engine, _) = engine();

    let _ = engine.context().query(&Unregistered).await;
}

#[tokio::test]
#[should_panic(expected = "service context not provided")]
async fn missing_service_context_panics() {
    let context = ServiceContext::<Env>::missing();

    let _ = context.run(|context| async move {
        context.query(&Double(1)).await
    });
}

#[tokio::test]
async fn effects_run_against_the_mounted_engine() {
    let (engine, _) = engine();
    let mounted = engine.mount();

    let effect = mounted
        .service_context()
        .run(|context| async move { context.query(&Double(21)).await });

    assert_eq!(effect.wait().await, Some(Ok(42)));
}
