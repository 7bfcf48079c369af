//! A failing request never fails its siblings.

use qfetch::QueryResult;
use qfetch_integration_test::{
    Artwork, Backend, GetArtwork, GetArtworks, Museum, MuseumError,
    artwork_url, artworks_url,
};

#[tokio::test]
async fn transport_and_parse_errors_stay_in_their_slot() {
    let backend = Backend::with_catalog(1, 3);
    backend.fail(artwork_url(2), "connection reset");
    backend.corrupt(artwork_url(3));

    let museum = Museum::with_backend(backend);
    let _mounted = museum.engine.mount();

    let mut ok = museum.engine.subscribe(GetArtwork::new(artwork_url(1)));
    let mut http = museum.engine.subscribe(GetArtwork::new(artwork_url(2)));
    let mut parse = museum.engine.subscribe(GetArtwork::new(artwork_url(3)));

    assert_eq!(ok.settled().await, Some(Ok(Artwork::titled("Artwork 1"))));
    assert_eq!(
        http.settled().await,
        Some(Err(MuseumError::Http {
            url: artwork_url(2),
            message: "connection reset".to_owned(),
        }))
    );
    assert!(matches!(
        parse.settled().await,
        Some(Err(MuseumError::ParseArtwork(_)))
    ));

    // one shared invocation answered all three
    assert_eq!(museum.fetch.invocation_count(), 1);
}

#[tokio::test]
async fn failed_listing_does_not_fail_item_queries() {
    let backend = Backend::with_catalog(1, 1);
    backend.fail(artworks_url(1), "503 service unavailable");

    let museum = Museum::with_backend(backend);
    let _mounted = museum.engine.mount();

    let mut listing = museum.engine.subscribe(GetArtworks { page: 1 });
    let mut item = museum.engine.subscribe(GetArtwork::new(artwork_url(1)));

    let listing = listing.settled().await;
    assert!(matches!(listing, Some(Err(MuseumError::Http { .. }))));
    assert_eq!(item.settled().await, Some(Ok(Artwork::titled("Artwork 1"))));
}

#[tokio::test]
async fn errors_are_rendered_as_done_states() {
    let backend = Backend::with_catalog(1, 1);
    backend.corrupt(artworks_url(1));

    let museum = Museum::with_backend(backend);
    let _mounted = museum.engine.mount();

    let mut listing = museum.engine.subscribe(GetArtworks { page: 1 });
    listing.settled().await;

    let state = listing.state();
    assert!(state.is_done());
    assert!(matches!(state.error(), Some(MuseumError::ParseArtworks(_))));
    assert_eq!(state.value(), None);
    assert_ne!(state, QueryResult::Loading);
}
