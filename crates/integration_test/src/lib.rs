//! Common test utilities and shared query/executor definitions for qfetch
//! integration tests.
//!
//! The fixtures model a small art-museum API: a listing of artwork pages and
//! one document per artwork. Requests are answered by a scripted in-memory
//! backend that counts every invocation and can be told to fail or to return
//! malformed documents for chosen URLs.

#![allow(missing_docs)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::missing_panics_doc)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::join_all;
use parking_lot::Mutex;
use qfetch::{
    Batch, CompletionMap, Context, DataSource, Engine, Executor, Fetch, Query,
    Request, SuccessCodec, TickerConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// ============================================================================
// Domain
// ============================================================================

/// One entry of an artwork listing.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ArtworkEntry {
    pub api_link: String,
}

/// One page of the artwork listing.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Artworks {
    pub data: Vec<ArtworkEntry>,
}

#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ArtworkData {
    pub title: String,
}

/// The document of a single artwork.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Artwork {
    pub data: ArtworkData,
}

impl Artwork {
    pub fn titled(title: impl Into<String>) -> Self {
        Self { data: ArtworkData { title: title.into() } }
    }
}

/// Everything that can go wrong while fetching from the museum.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error,
)]
pub enum MuseumError {
    #[error("http request to `{url}` failed: {message}")]
    Http { url: String, message: String },

    #[error("malformed artwork listing: {0}")]
    ParseArtworks(String),

    #[error("malformed artwork: {0}")]
    ParseArtwork(String),
}

pub fn artworks_url(page: u32) -> String {
    format!("https://api.artic.edu/api/v1/artworks?page={page}")
}

pub fn artwork_url(id: u32) -> String {
    format!("https://api.artic.edu/api/v1/artworks/{id}")
}

// ============================================================================
// Backend
// ============================================================================

/// A scripted in-memory HTTP backend.
#[derive(Debug, Default)]
pub struct Backend {
    documents: Mutex<HashMap<String, Result<Value, String>>>,
    hits: AtomicUsize,
}

impl Backend {
    /// A backend serving `pages` listing pages of `per_page` artworks each.
    ///
    /// Artwork ids start at 1 and run across pages; artwork `n` is titled
    /// `Artwork n`.
    pub fn with_catalog(pages: u32, per_page: u32) -> Self {
        let backend = Self::default();

        for page in 1..=pages {
            let ids = (1..=per_page).map(|i| (page - 1) * per_page + i);

            let entries = ids
                .clone()
                .map(|id| json!({ "api_link": artwork_url(id) }))
                .collect::<Vec<_>>();
            backend.serve(artworks_url(page), json!({ "data": entries }));

            for id in ids {
                backend.serve(
                    artwork_url(id),
                    json!({ "data": { "title": format!("Artwork {id}") } }),
                );
            }
        }

        backend
    }

    pub fn serve(&self, url: impl Into<String>, document: Value) {
        self.documents.lock().insert(url.into(), Ok(document));
    }

    /// Makes every later request to `url` fail at the transport level.
    pub fn fail(&self, url: impl Into<String>, message: impl Into<String>) {
        self.documents.lock().insert(url.into(), Err(message.into()));
    }

    /// Makes `url` answer with a document of an unexpected shape.
    pub fn corrupt(&self, url: impl Into<String>) {
        self.serve(url, json!({ "unexpected": true }));
    }

    /// The number of requests the backend received.
    pub fn hits(&self) -> usize { self.hits.load(Ordering::SeqCst) }

    pub async fn get(&self, url: &str) -> Result<Value, MuseumError> {
        self.hits.fetch_add(1, Ordering::SeqCst);

        // answer on a later poll, like a real transport would
        tokio::task::yield_now().await;

        match self.documents.lock().get(url) {
            Some(Ok(document)) => Ok(document.clone()),
            Some(Err(message)) => Err(MuseumError::Http {
                url: url.to_owned(),
                message: message.clone(),
            }),
            None => Err(MuseumError::Http {
                url: url.to_owned(),
                message: "404 not found".to_owned(),
            }),
        }
    }
}

/// Fetches and validates museum documents.
#[derive(Debug, Clone)]
pub struct ArtworkRepo {
    backend: Arc<Backend>,
}

impl ArtworkRepo {
    pub fn new(backend: Arc<Backend>) -> Self { Self { backend } }

    pub async fn get_artworks(
        &self,
        page: u32,
    ) -> Result<Artworks, MuseumError> {
        let document = self.backend.get(&artworks_url(page)).await?;

        serde_json::from_value(document)
            .map_err(|error| MuseumError::ParseArtworks(error.to_string()))
    }

    pub async fn get_artwork(
        &self,
        url: &str,
    ) -> Result<Artwork, MuseumError> {
        let document = self.backend.get(url).await?;

        serde_json::from_value(document)
            .map_err(|error| MuseumError::ParseArtwork(error.to_string()))
    }
}

// ============================================================================
// Requests and Data Source
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MuseumRequest {
    Artworks { page: u32 },
    Artwork { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuseumPayload {
    Artworks(Artworks),
    Artwork(Artwork),
}

impl Request for MuseumRequest {
    type Value = MuseumPayload;
    type Error = MuseumError;
}

/// Answers museum requests through the repository, every request of an
/// invocation in parallel.
#[derive(Debug, Clone)]
pub struct MuseumFetch {
    repo: ArtworkRepo,
    invocations: Arc<Mutex<Vec<Vec<MuseumRequest>>>>,
    latency: Duration,
}

impl MuseumFetch {
    pub fn new(repo: ArtworkRepo) -> Self {
        Self {
            repo,
            invocations: Arc::default(),
            latency: Duration::ZERO,
        }
    }

    /// Delays every invocation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every invocation so far, as the flattened requests it received.
    pub fn invocations(&self) -> Vec<Vec<MuseumRequest>> {
        self.invocations.lock().clone()
    }

    pub fn invocation_count(&self) -> usize { self.invocations.lock().len() }

    async fn answer_one(
        &self,
        request: &MuseumRequest,
    ) -> Result<MuseumPayload, MuseumError> {
        match request {
            MuseumRequest::Artworks { page } => {
                let artworks = self.repo.get_artworks(*page).await;
                artworks.map(MuseumPayload::Artworks)
            }
            MuseumRequest::Artwork { url } => {
                self.repo.get_artwork(url).await.map(MuseumPayload::Artwork)
            }
        }
    }
}

impl Fetch<MuseumRequest> for MuseumFetch {
    async fn answer(
        &self,
        batches: &[Batch<MuseumRequest>],
    ) -> Result<CompletionMap<MuseumRequest>, MuseumError> {
        let requests = batches.iter().flatten().cloned().collect::<Vec<_>>();
        self.invocations.lock().push(requests.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcomes =
            join_all(requests.iter().map(|request| self.answer_one(request)))
                .await;

        Ok(requests.into_iter().zip(outcomes).collect())
    }
}

pub type MuseumSource = DataSource<MuseumRequest, MuseumFetch>;

/// The environment handed to every museum executor.
#[derive(Debug, Clone)]
pub struct MuseumEnv {
    pub artworks: Arc<MuseumSource>,
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GetArtworks {
    pub page: u32,
}

impl Query for GetArtworks {
    type Value = Artworks;
    type Error = MuseumError;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GetArtwork {
    pub url: String,
}

impl GetArtwork {
    pub fn new(url: impl Into<String>) -> Self { Self { url: url.into() } }
}

impl Query for GetArtwork {
    type Value = Artwork;
    type Error = MuseumError;
}

/// A listing page together with the documents of its artworks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GetArtworkPage {
    pub page: u32,
}

impl Query for GetArtworkPage {
    type Value = Vec<Artwork>;
    type Error = MuseumError;
}

#[derive(Debug, Default)]
pub struct GetArtworksExecutor(pub AtomicUsize);

impl Executor<GetArtworks, MuseumEnv> for GetArtworksExecutor {
    async fn execute(
        &self,
        query: &GetArtworks,
        context: &Context<MuseumEnv>,
    ) -> Result<Artworks, MuseumError> {
        self.0.fetch_add(1, Ordering::SeqCst);

        let request = MuseumRequest::Artworks { page: query.page };

        match context.env().artworks.fetch(request).await? {
            MuseumPayload::Artworks(artworks) => Ok(artworks),
            MuseumPayload::Artwork(_) => Err(MuseumError::ParseArtworks(
                "expected an artwork listing".to_owned(),
            )),
        }
    }
}

#[derive(Debug, Default)]
pub struct GetArtworkExecutor(pub AtomicUsize);

impl Executor<GetArtwork, MuseumEnv> for GetArtworkExecutor {
    async fn execute(
        &self,
        query: &GetArtwork,
        context: &Context<MuseumEnv>,
    ) -> Result<Artwork, MuseumError> {
        self.0.fetch_add(1, Ordering::SeqCst);

        let request = MuseumRequest::Artwork { url: query.url.clone() };

        match context.env().artworks.fetch(request).await? {
            MuseumPayload::Artwork(artwork) => Ok(artwork),
            MuseumPayload::Artworks(_) => Err(MuseumError::ParseArtwork(
                "expected a single artwork".to_owned(),
            )),
        }
    }
}

/// Fetches a page, then every artwork of the page in parallel.
#[derive(Debug, Default)]
pub struct GetArtworkPageExecutor(pub AtomicUsize);

impl Executor<GetArtworkPage, MuseumEnv> for GetArtworkPageExecutor {
    async fn execute(
        &self,
        query: &GetArtworkPage,
        context: &Context<MuseumEnv>,
    ) -> Result<Vec<Artwork>, MuseumError> {
        self.0.fetch_add(1, Ordering::SeqCst);

        let listing =
            context.query(&GetArtworks { page: query.page }).await?;

        let items = listing
            .data
            .into_iter()
            .map(|entry| GetArtwork::new(entry.api_link))
            .collect::<Vec<_>>();

        join_all(items.iter().map(|item| context.query(item)))
            .await
            .into_iter()
            .collect()
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A fully wired museum engine plus handles to its moving parts.
#[derive(Debug)]
pub struct Museum {
    pub engine: Arc<Engine<MuseumEnv>>,
    pub backend: Arc<Backend>,
    pub fetch: MuseumFetch,
    pub get_artworks: Arc<GetArtworksExecutor>,
    pub get_artwork: Arc<GetArtworkExecutor>,
    pub get_artwork_page: Arc<GetArtworkPageExecutor>,
}

impl Museum {
    /// A museum over a catalog of 2 pages with 3 artworks each.
    pub fn new() -> Self { Self::with_backend(Backend::with_catalog(2, 3)) }

    pub fn with_backend(backend: Backend) -> Self {
        let backend = Arc::new(backend);
        let fetch = MuseumFetch::new(ArtworkRepo::new(backend.clone()));

        Self::build(backend, fetch, TickerConfig::default())
    }

    pub fn build(
        backend: Arc<Backend>,
        fetch: MuseumFetch,
        ticker: TickerConfig,
    ) -> Self {
        let artworks =
            Arc::new(DataSource::new("ArticMuseum", fetch.clone()));

        let mut engine = Engine::new(MuseumEnv { artworks: artworks.clone() })
            .with_ticker_config(ticker);
        engine.register_source(artworks);

        let get_artworks = Arc::new(GetArtworksExecutor::default());
        let get_artwork = Arc::new(GetArtworkExecutor::default());
        let get_artwork_page = Arc::new(GetArtworkPageExecutor::default());

        engine.register_cached::<GetArtworks, _, _>(
            get_artworks.clone(),
            SuccessCodec::new(|query: &GetArtworks| {
                format!("getArtworks({})", query.page)
            }),
        );
        engine.register_cached::<GetArtwork, _, _>(
            get_artwork.clone(),
            SuccessCodec::new(|query: &GetArtwork| {
                format!("getArtwork({})", query.url)
            }),
        );
        engine
            .register_executor::<GetArtworkPage, _>(get_artwork_page.clone());

        Self {
            engine: Arc::new(engine),
            backend,
            fetch,
            get_artworks,
            get_artwork,
            get_artwork_page,
        }
    }

    pub fn source(&self) -> &MuseumSource { &self.engine.env().artworks }

    /// Waits until at least `submissions` submissions are queued.
    pub async fn wait_for_submissions(&self, submissions: usize) {
        while self.source().pending() < submissions {
            tokio::task::yield_now().await;
        }
    }
}

impl Default for Museum {
    fn default() -> Self { Self::new() }
}
