//! Plug-in contracts the cache consumes: the external loader, the load-all
//! completion listener, and listener registrations released on close.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::CacheError;
use super::types::Data;

/// Reads entries from the external data source backing a cache.
///
/// Called by partition owners while executing a load-all; the proxy only
/// checks whether a loader is configured.
pub trait CacheLoader: Send + Sync {
    /// Loads the given keys. Keys missing from the result are not in the source.
    fn load(&self, keys: &[Data]) -> anyhow::Result<HashMap<Data, Data>>;

    /// Every key the source knows, used by a load-all with an empty key set.
    fn load_all_keys(&self) -> anyhow::Result<Vec<Data>> {
        Ok(Vec::new())
    }

    /// Releases resources held by the loader.
    fn close(&self) {}
}

/// Creates a fresh loader instance each time a cache is opened.
pub trait CacheLoaderFactory: Send + Sync {
    fn create(&self) -> Arc<dyn CacheLoader>;
}

impl<F> CacheLoaderFactory for F
where
    F: Fn() -> Arc<dyn CacheLoader> + Send + Sync,
{
    fn create(&self) -> Arc<dyn CacheLoader> {
        self()
    }
}

/// Receives the single aggregated outcome of a load-all.
pub trait CompletionListener: Send + Sync {
    fn on_completion(&self);

    fn on_failure(&self, error: CacheError);
}

/// Resource held on behalf of a registered listener, released when the cache
/// closes.
pub trait ListenerRegistration: Send + Sync {
    fn deregister(&self);
}
