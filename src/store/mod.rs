//! Partition Storage Module
//!
//! The engine a partition owner runs to execute cache operations. The proxy
//! never calls it directly; it is reached through an invocation channel, either
//! in-process or over HTTP via `handlers`.
//!
//! ## Core Concepts
//! - **Authoritative comparisons**: conditional writes are adjudicated here,
//!   against the stored entry, never against a proxy's near cache.
//! - **Per-partition load**: a load-all arrives once per partition and pulls
//!   only that partition's keys from the cache's loader.
//! - **Merge**: entries applied from a peer go through the cache's merge policy.

pub mod handlers;
pub mod memory;
pub mod merge;
