//! # qfetch - Batched, Hydratable Query Fetching
//!
//! qfetch is an asynchronous data-fetching layer built on Tokio. Independent
//! callers submit requests to [`DataSource`]s; a [`Ticker`] flushes every
//! source once per scheduling pass, so requests issued by unrelated code
//! within the same pass reach the backend as one round-trip. On top of the
//! sources sits a reactive query layer: each [`QuerySubscription`] re-executes
//! its query whenever its dependency key changes and exposes the result as a
//! [`QueryResult`] state machine.
//!
//! Typical use cases include:
//! - Collapsing N per-item lookups issued by N independent components into a
//!   single batched backend call
//! - Rendering pages on a server, serializing the fetched data, and hydrating
//!   it on the client without refetching
//! - Driving queries from UI events published to a [`Hub`]
//!
//! ## Key Features
//!
//! - **Tick Coalescing**: Every submission drained by one tick is answered
//!   together
//! - **Failure Isolation**: A failed request only fails its own slot of the
//!   [`CompletionMap`]
//! - **Stale-Result Safety**: A dependency change abandons the in-flight
//!   execution in favour of the new one
//! - **Prefetch and Hydration**: Successful outcomes of cached queries are
//!   written to a flat JSON snapshot and consumed once on the client
//! - **Explicit Environments**: Executors reach their data sources through a
//!   plain dependency struct rather than a runtime service lookup
//!
//! ## Engine Lifecycle
//!
//! 1. **Create**: Instantiate an [`Engine`] around your environment struct
//! 2. **Register**: Add executors via
//!    [`register_executor`](Engine::register_executor) or
//!    [`register_cached`](Engine::register_cached), and the data sources to
//!    tick via [`register_source`](Engine::register_source)
//! 3. **Wrap**: Convert to `Arc<Engine>` for shared ownership
//! 4. **Prefetch** (server): [`prefetch`](Engine::prefetch) produces the
//!    snapshot text
//! 5. **Hydrate** (client): [`hydrate`](Engine::hydrate) loads it
//! 6. **Mount**: [`mount`](Engine::mount) starts the ticker
//! 7. **Subscribe**: [`subscribe`](Engine::subscribe) to queries, and drop the
//!    subscriptions to cancel them
//!
//! ## Thread Safety
//!
//! - `&mut Engine`: Required for registration
//! - `Arc<Engine>`: The standard pattern for shared engine ownership
//! - [`Context`]: Cheap to clone; handed to executors for composing queries
//!
//! For full usage examples, see the `integration_test` crate.

pub mod cache;
pub mod completion;
pub mod config;
pub mod data_source;
pub mod engine;
pub mod executor;
pub mod hub;
pub mod query;
pub mod request;
pub mod ticker;

pub use cache::{CacheEntry, Codec, Snapshot, SuccessCodec};
pub use completion::CompletionMap;
pub use config::{Coalesce, DataSourceConfig, TickerConfig};
pub use data_source::{DataSource, Fetch, Interrupted, Submission, fetch_fn};
pub use engine::{
    Context, EffectHandle, Engine, Mounted, QuerySubscription, ServiceContext,
};
pub use executor::Executor;
pub use hub::{Hub, Subscriber};
pub use query::{Query, QueryResult};
pub use request::{Batch, Request};
pub use ticker::{Tick, TickReport, Ticker, TickerHandle};
