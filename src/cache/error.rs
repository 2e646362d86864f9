//! Error kinds surfaced by the cache proxy.

use std::time::Duration;
use thiserror::Error;

use crate::cluster::types::PartitionId;

/// Every failure a cache operation can report.
///
/// Argument and state errors are raised before any network activity. Remote
/// errors are carried verbatim from the invocation channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Remote operation failed: {0}")]
    Remote(String),

    #[error("Problem while waiting for load-all tasks to complete ({failures} failed): {first}")]
    AggregatedShutdown {
        failures: usize,
        first: Box<CacheError>,
    },

    #[error("Load-all failed on partition {partition}: {cause}")]
    LoadFailure { partition: PartitionId, cause: String },

    #[error("Load-all task {task} did not complete within {timeout:?}")]
    TaskTimedOut { task: String, timeout: Duration },

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

impl CacheError {
    pub fn closed(cache_name: &str) -> Self {
        Self::IllegalState(format!(
            "Cache operations can not be performed. The cache {} is closed",
            cache_name
        ))
    }

    pub fn remote(error: impl std::fmt::Display) -> Self {
        Self::Remote(error.to_string())
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}
