//! Query definitions and the per-subscription result state machine.
//!
//! A query is the *argument* of a computation: a cheap, comparable value that
//! doubles as the dependency key of a subscription. The computation itself is
//! provided by an [`Executor`](crate::executor::Executor) registered with the
//! [`Engine`](crate::engine::Engine).
//!
//! ```rust
//! use qfetch::query::Query;
//!
//! /// One page of the artwork listing.
//! #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! struct GetArtworks {
//!     page: u32,
//! }
//!
//! impl Query for GetArtworks {
//!     type Value = Vec<String>;
//!     type Error = String;
//! }
//! ```
//!
//! Executions never fault: their outcome is a `Result` that ends up inside
//! the [`QueryResult`] exposed to subscribers.

use std::{fmt::Debug, hash::Hash};

mod result;

pub use result::QueryResult;

/// The argument of a query, associated with its outcome types.
///
/// Equality is the dependency comparison: re-subscribing with an equal query
/// never re-issues work.
pub trait Query: Debug + Clone + Eq + Hash + Send + Sync + 'static {
    /// The value produced when the query succeeds.
    type Value: Debug + Clone + Send + Sync + 'static;

    /// The error produced when the query fails.
    type Error: Debug + Clone + Send + Sync + 'static;
}

/// The outcome of executing a query.
pub type Outcome<Q> = Result<<Q as Query>::Value, <Q as Query>::Error>;
