//! Local cache tier consulted before any remote round trip.
//!
//! A key maps to either a value or the `Absent` marker, which records that the
//! owner confirmed the key does not exist. A key with no entry at all is
//! simply unknown. Reads never block; writes are best-effort.

use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

use super::config::NearCacheConfig;
use super::types::Data;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Present(Data),
    Absent,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NearCacheError {
    #[error("near cache is full ({max_size} entries)")]
    Full { max_size: usize },
}

pub trait NearCache: Send + Sync {
    /// `None` means the key is not cached locally.
    fn get(&self, key: &Data) -> Option<CachedValue>;

    fn put(&self, key: Data, value: CachedValue) -> Result<(), NearCacheError>;

    fn invalidate(&self, key: &Data);

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the near cache for a proxy. A missing configuration yields
/// [`NoNearCache`], so call sites never branch on whether one exists.
pub fn from_config(config: Option<&NearCacheConfig>) -> Arc<dyn NearCache> {
    match config {
        Some(config) => Arc::new(LocalNearCache::new(config.max_size)),
        None => Arc::new(NoNearCache),
    }
}

/// Bounded concurrent map. Once `max_size` keys are held, writes for new keys
/// are rejected while existing keys can still be refreshed.
pub struct LocalNearCache {
    entries: DashMap<Data, CachedValue>,
    max_size: usize,
}

impl LocalNearCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_size,
        }
    }
}

impl NearCache for LocalNearCache {
    fn get(&self, key: &Data) -> Option<CachedValue> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: Data, value: CachedValue) -> Result<(), NearCacheError> {
        if let Some(mut existing) = self.entries.get_mut(&key) {
            *existing = value;
            return Ok(());
        }
        if self.entries.len() >= self.max_size {
            return Err(NearCacheError::Full {
                max_size: self.max_size,
            });
        }
        self.entries.insert(key, value);
        Ok(())
    }

    fn invalidate(&self, key: &Data) {
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Near cache of a proxy configured without one: stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNearCache;

impl NearCache for NoNearCache {
    fn get(&self, _: &Data) -> Option<CachedValue> {
        None
    }

    fn put(&self, _: Data, _: CachedValue) -> Result<(), NearCacheError> {
        Ok(())
    }

    fn invalidate(&self, _: &Data) {}

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }
}
