//! Cache Proxy Module
//!
//! Client-side access to one named, partitioned cache.
//!
//! ## Core Concepts
//! - **Proxy**: `CacheProxy` turns typed key/value calls into partition-routed
//!   invocations and offers every operation in an awaiting and a handle form.
//! - **Near cache**: an optional local tier holding recently read or written
//!   values, plus `Absent` markers for keys the owner confirmed missing.
//! - **Statistics**: hit/miss/latency counters kept per proxy.
//! - **Lifecycle**: `Open -> Closed -> Open` until destroyed; closing waits a
//!   bounded time for background load-all tasks.
//! - **Load-all**: a background fan-out asking every partition owner to pull
//!   entries from the cache's loader.

pub mod config;
pub mod error;
pub mod future;
pub mod lifecycle;
pub mod load_all;
pub mod loader;
pub mod near_cache;
pub mod proxy;
pub mod stats;
pub mod types;

#[cfg(test)]
mod tests;
