//! Configuration for data sources and the ticker.
//!
//! Both configurations are plain values built with a builder; every field has
//! a default, so `DataSourceConfig::builder().build()` is the default
//! configuration.
//!
//! ```rust
//! use qfetch::config::{Coalesce, DataSourceConfig, TickerConfig};
//!
//! let data_source = DataSourceConfig::builder()
//!     .coalesce(Coalesce::PerSubmission)
//!     .deduplicate(false)
//!     .build();
//!
//! let ticker = TickerConfig::builder().park_when_idle(false).build();
//! # let _ = (data_source, ticker);
//! ```

use bon::Builder;

/// How a tick turns the drained submissions into `answer` invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Coalesce {
    /// Answer the union of every drained submission with one invocation.
    ///
    /// This is what turns N independent per-caller fetches issued within one
    /// tick interval into a single round-trip.
    #[default]
    Union,

    /// Fork one invocation per drained submission and run them in parallel.
    PerSubmission,
}

/// Configuration of a [`DataSource`](crate::data_source::DataSource).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Builder)]
pub struct DataSourceConfig {
    /// How drained submissions are grouped into `answer` invocations.
    #[builder(default)]
    pub coalesce: Coalesce,

    /// Whether requests that are equal by value are sent to `answer` only
    /// once per invocation. Every submitter still receives the outcome.
    #[builder(default = true)]
    pub deduplicate: bool,
}

impl Default for DataSourceConfig {
    fn default() -> Self { Self::builder().build() }
}

/// Configuration of a [`Ticker`](crate::ticker::Ticker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Builder)]
pub struct TickerConfig {
    /// Whether a round that found every queue empty parks the ticker until
    /// a registered source receives a submission, instead of spinning.
    #[builder(default = true)]
    pub park_when_idle: bool,
}

impl Default for TickerConfig {
    fn default() -> Self { Self::builder().build() }
}
