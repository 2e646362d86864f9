//! Distributed Cache Library
//!
//! A near-cached client proxy over a partitioned, in-memory cache cluster.
//! The binary (`main.rs`) runs one cluster member; the library can also embed
//! a member and a proxy in the same process.
//!
//! ## Architecture Modules
//! The system is composed of three loosely coupled subsystems:
//!
//! - **`cache`**: The client side. `CacheProxy` validates arguments, consults
//!   the near cache, routes each key to its partition, and keeps statistics and
//!   the open/closed/destroyed lifecycle of the cache.
//! - **`cluster`**: The seam between proxy and cluster. Partition routing over
//!   the membership table, and invocation channels that reach a partition owner
//!   in-process or over HTTP.
//! - **`store`**: The member side. Executes operations against the partitions a
//!   member owns, runs loaders for load-all, and serves invocations over HTTP.

pub mod cache;
pub mod cluster;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
