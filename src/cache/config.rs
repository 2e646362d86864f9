use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::error::{CacheError, CacheResult};
use super::loader::CacheLoaderFactory;
use crate::store::merge::{CacheMergePolicy, PassThroughMergePolicy};

/// Bounded wait applied to each pending load-all task while closing.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_NEAR_CACHE_MAX_SIZE: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearCacheConfig {
    /// Maximum number of keys held locally. New keys are rejected once full.
    pub max_size: usize,
}

impl Default for NearCacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_NEAR_CACHE_MAX_SIZE,
        }
    }
}

/// Configuration of one named cache, shared by its proxies and its owners.
#[derive(Clone)]
pub struct CacheConfig {
    pub name: String,
    /// `None` disables the near cache entirely.
    pub near_cache: Option<NearCacheConfig>,
    pub statistics_enabled: bool,
    pub close_timeout: Duration,
    pub loader_factory: Option<Arc<dyn CacheLoaderFactory>>,
    pub merge_policy: Arc<dyn CacheMergePolicy>,
}

impl CacheConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            near_cache: None,
            statistics_enabled: true,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            loader_factory: None,
            merge_policy: Arc::new(PassThroughMergePolicy),
        }
    }

    pub fn with_near_cache(mut self, near_cache: NearCacheConfig) -> Self {
        self.near_cache = Some(near_cache);
        self
    }

    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.statistics_enabled = enabled;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn with_loader_factory(mut self, factory: Arc<dyn CacheLoaderFactory>) -> Self {
        self.loader_factory = Some(factory);
        self
    }

    pub fn with_merge_policy(mut self, policy: Arc<dyn CacheMergePolicy>) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.name.trim().is_empty() {
            return Err(CacheError::InvalidArgument(
                "cache name must not be empty".to_string(),
            ));
        }
        if let Some(near_cache) = &self.near_cache
            && near_cache.max_size == 0
        {
            return Err(CacheError::InvalidArgument(
                "near cache max_size must be greater than zero".to_string(),
            ));
        }
        if self.close_timeout.is_zero() {
            return Err(CacheError::InvalidArgument(
                "close_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("name", &self.name)
            .field("near_cache", &self.near_cache)
            .field("statistics_enabled", &self.statistics_enabled)
            .field("close_timeout", &self.close_timeout)
            .field("loader_configured", &self.loader_factory.is_some())
            .finish()
    }
}
