//! Subscriptions move through Loading, Done, and Refreshing.

use qfetch::QueryResult;
use qfetch_integration_test::{
    Backend, GetArtworks, Museum, MuseumError, artwork_url, artworks_url,
};

#[tokio::test]
async fn re_execution_keeps_the_previous_outcome_visible() {
    let museum = Museum::new();
    let ticker = museum.engine.ticker();

    let mut subscription = museum.engine.subscribe(GetArtworks { page: 1 });
    assert_eq!(subscription.state(), QueryResult::Loading);

    museum.wait_for_submissions(1).await;
    ticker.round().await;

    let first = subscription.settled().await.unwrap().unwrap();
    assert_eq!(first.data[0].api_link, artwork_url(1));

    assert!(subscription.set_dependency(GetArtworks { page: 2 }));
    assert_eq!(
        subscription.changed().await,
        Some(QueryResult::Refreshing(Ok(first)))
    );

    museum.wait_for_submissions(1).await;
    ticker.round().await;

    let second = subscription.settled().await.unwrap().unwrap();
    assert_eq!(second.data[0].api_link, artwork_url(4));
    assert_eq!(subscription.state(), QueryResult::Done(Ok(second)));
}

#[tokio::test]
async fn failure_stays_visible_while_refreshing() {
    let backend = Backend::with_catalog(2, 1);
    backend.fail(artworks_url(1), "timeout");

    let museum = Museum::with_backend(backend);
    let ticker = museum.engine.ticker();

    let mut subscription = museum.engine.subscribe(GetArtworks { page: 1 });
    museum.wait_for_submissions(1).await;
    ticker.round().await;

    let failure = subscription.settled().await.unwrap();
    assert!(matches!(failure, Err(MuseumError::Http { .. })));

    subscription.set_dependency(GetArtworks { page: 2 });
    let refreshing = subscription.changed().await.unwrap();
    assert_eq!(refreshing, QueryResult::Refreshing(failure));

    museum.wait_for_submissions(1).await;
    ticker.round().await;

    assert!(subscription.settled().await.unwrap().is_ok());
}

#[tokio::test]
async fn equal_dependency_keeps_the_state() {
    let museum = Museum::new();
    let _mounted = museum.engine.mount();

    let mut subscription = museum.engine.subscribe(GetArtworks { page: 1 });
    let settled = subscription.settled().await.unwrap();

    assert!(!subscription.set_dependency(GetArtworks { page: 1 }));

    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    assert_eq!(subscription.state(), QueryResult::Done(settled));
    assert_eq!(museum.fetch.invocation_count(), 1);
}
