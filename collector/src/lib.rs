//! Bounded concurrent URL fetching over a two-tier worker pool.
//!
//! A fixed set of permanent fetchers is spawned up front; batches that need
//! more parallelism than the permanent pool can hand out grow into a capped
//! elastic tier of transient overflow fetchers.

pub mod error;
pub mod pool;
mod worker;

pub use error::CollectError;
pub use pool::{Collector, FetchPool, FetchResult};
