//! A hydrated client renders prefetched data without fetching it again.

use std::sync::atomic::Ordering;

use qfetch::{CacheEntry, QueryResult, Snapshot, cache::SnapshotError};
use qfetch_integration_test::{
    Artwork, GetArtwork, GetArtworks, Museum, MuseumRequest, artwork_url,
};

async fn server_snapshot() -> String {
    let server = Museum::new();

    let text = server
        .engine
        .collect_prefetch(|context| async move {
            context.query(&GetArtworks { page: 1 }).await
        })
        .await;

    assert_eq!(server.fetch.invocation_count(), 1);
    text
}

#[tokio::test]
async fn hydrated_subscription_starts_done_and_never_fetches() {
    let text = server_snapshot().await;

    let client = Museum::new();
    assert_eq!(client.engine.hydrate(&text).unwrap(), 1);
    let _mounted = client.engine.mount();

    let mut subscription = client.engine.subscribe(GetArtworks { page: 1 });
    assert!(subscription.state().is_done());

    let listing = subscription.settled().await.unwrap().unwrap();
    assert_eq!(listing.data.len(), 3);

    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    assert_eq!(client.fetch.invocation_count(), 0);
    assert_eq!(client.get_artworks.0.load(Ordering::SeqCst), 0);
    assert_eq!(client.backend.hits(), 0);

    // the live query owns freshness from here on
    subscription.set_dependency(GetArtworks { page: 2 });
    assert_eq!(
        subscription.changed().await,
        Some(QueryResult::Refreshing(Ok(listing)))
    );
    assert_eq!(
        subscription.settled().await.unwrap().unwrap().data[0].api_link,
        artwork_url(4)
    );
    assert_eq!(client.fetch.invocation_count(), 1);
}

#[tokio::test]
async fn snapshot_entries_are_consumed_once() {
    let text = server_snapshot().await;

    let client = Museum::new();
    client.engine.hydrate(&text).unwrap();
    let _mounted = client.engine.mount();

    let first = client.engine.subscribe(GetArtworks { page: 1 });
    assert!(first.state().is_done());
    assert!(client.engine.snapshot().is_empty());

    let mut second = client.engine.subscribe(GetArtworks { page: 1 });
    assert_eq!(second.state(), QueryResult::Loading);
    assert!(second.settled().await.unwrap().is_ok());
    assert_eq!(client.fetch.invocation_count(), 1);
}

#[tokio::test]
async fn malformed_entry_degrades_only_its_own_query() {
    let listing = Museum::new()
        .engine
        .collect_prefetch(|context| async move {
            context.query(&GetArtworks { page: 1 }).await
        })
        .await;
    let listing = Snapshot::parse(&listing).unwrap();

    let mut entries = listing.entries();
    entries.push(CacheEntry::new(
        format!("getArtwork({})", artwork_url(1)),
        r#"{"nope":1}"#,
    ));
    let text = Snapshot::from_entries(entries).to_json();

    let client = Museum::new();
    assert_eq!(client.engine.hydrate(&text).unwrap(), 2);
    let _mounted = client.engine.mount();

    let listing = client.engine.subscribe(GetArtworks { page: 1 });
    let mut artwork = client.engine.subscribe(GetArtwork::new(artwork_url(1)));

    assert!(listing.state().is_done());
    assert_eq!(artwork.state(), QueryResult::Loading);
    assert_eq!(
        artwork.settled().await,
        Some(Ok(Artwork::titled("Artwork 1")))
    );

    assert_eq!(client.fetch.invocations(), vec![vec![
        MuseumRequest::Artwork { url: artwork_url(1) }
    ]]);
}

#[tokio::test]
async fn malformed_snapshot_is_rejected_as_a_whole() {
    let client = Museum::new();

    assert!(matches!(
        client.engine.hydrate("<html>"),
        Err(SnapshotError::Malformed(_))
    ));
    assert!(client.engine.snapshot().is_empty());

    let _mounted = client.engine.mount();
    let mut subscription = client.engine.subscribe(GetArtworks { page: 1 });

    assert_eq!(subscription.state(), QueryResult::Loading);
    assert!(subscription.settled().await.unwrap().is_ok());
}

#[tokio::test]
async fn hydration_keeps_the_first_entry_for_a_key() {
    let client = Museum::new();

    let first = Snapshot::from_entries([CacheEntry::new("k", "1")]);
    let second = Snapshot::from_entries([
        CacheEntry::new("k", "2"),
        CacheEntry::new("other", "3"),
    ]);

    assert_eq!(client.engine.hydrate_snapshot(&first), 1);
    assert_eq!(client.engine.hydrate_snapshot(&second), 1);
    assert_eq!(client.engine.snapshot().get("k").as_deref(), Some("1"));
}
