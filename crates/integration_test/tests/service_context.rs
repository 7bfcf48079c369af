//! Effects run against a mounted engine; running one without it is a bug.

use qfetch::ServiceContext;
use qfetch_integration_test::{
    Artwork, Backend, GetArtwork, Museum, MuseumEnv, artwork_url,
};
use tokio::sync::oneshot;
use tracing_test::traced_test;

#[tokio::test]
#[should_panic(expected = "service context not provided")]
async fn effect_without_a_mounted_engine_panics() {
    let context = ServiceContext::<MuseumEnv>::default();

    let _ = context.run(|context| async move {
        context.query(&GetArtwork::new(artwork_url(1))).await
    });
}

#[tokio::test]
async fn effect_queries_the_mounted_engine() {
    let museum = Museum::new();
    let mounted = museum.engine.mount();

    let services = mounted.service_context();
    assert!(services.is_provided());

    let effect = services.run(|context| async move {
        context.query(&GetArtwork::new(artwork_url(3))).await
    });

    assert_eq!(effect.wait().await, Some(Ok(Artwork::titled("Artwork 3"))));
}

#[tokio::test]
#[traced_test]
async fn failed_effect_is_logged_instead_of_returned() {
    let backend = Backend::with_catalog(1, 1);
    backend.fail(artwork_url(1), "unreachable");

    let museum = Museum::with_backend(backend);
    let mounted = museum.engine.mount();

    let effect = mounted.service_context().run_with_error_log(|context| {
        async move { context.query(&GetArtwork::new(artwork_url(1))).await }
    });

    assert_eq!(effect.wait().await, Some(None));
    assert!(logs_contain("effect failed"));
    assert!(logs_contain("unreachable"));
}

#[tokio::test]
async fn dropping_the_handle_interrupts_the_effect() {
    let museum = Museum::new();
    let mounted = museum.engine.mount();

    let (sender, receiver) = oneshot::channel::<()>();

    let effect = mounted.service_context().run(|_context| async move {
        let _sender = sender;
        std::future::pending::<()>().await;
    });

    assert!(!effect.is_finished());
    drop(effect);

    assert!(receiver.await.is_err());
}
