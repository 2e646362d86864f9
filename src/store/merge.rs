//! Merge policies
//!
//! Decide which value survives when entries for the same key meet, e.g. when a
//! partition dump from another member is applied after a split heals. Selected
//! once per cache through its configuration.

use crate::cache::types::{CacheEntryView, Data};

pub trait CacheMergePolicy: Send + Sync {
    /// Returns the value that should be stored for the key.
    fn merge(
        &self,
        cache_name: &str,
        incoming: &CacheEntryView,
        existing: Option<&CacheEntryView>,
    ) -> Data;
}

/// The incoming entry always wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughMergePolicy;

impl CacheMergePolicy for PassThroughMergePolicy {
    fn merge(&self, _: &str, incoming: &CacheEntryView, _: Option<&CacheEntryView>) -> Data {
        incoming.value.clone()
    }
}

/// The incoming entry is only taken if nothing is stored yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct PutIfAbsentMergePolicy;

impl CacheMergePolicy for PutIfAbsentMergePolicy {
    fn merge(
        &self,
        _: &str,
        incoming: &CacheEntryView,
        existing: Option<&CacheEntryView>,
    ) -> Data {
        match existing {
            Some(existing) => existing.value.clone(),
            None => incoming.value.clone(),
        }
    }
}

/// The entry that was read more often wins; ties go to the incoming entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct HigherHitsMergePolicy;

impl CacheMergePolicy for HigherHitsMergePolicy {
    fn merge(
        &self,
        _: &str,
        incoming: &CacheEntryView,
        existing: Option<&CacheEntryView>,
    ) -> Data {
        match existing {
            Some(existing) if existing.hits > incoming.hits => existing.value.clone(),
            _ => incoming.value.clone(),
        }
    }
}
