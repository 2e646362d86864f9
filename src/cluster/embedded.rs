//! In-process invocation channel.
//!
//! Used when the proxy lives in a member that also stores the data. Each
//! invocation runs as its own task on the runtime the channel was created on;
//! load-all operations go to the blocking pool since loaders do I/O.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::runtime::Handle;

use super::InvocationChannel;
use super::protocol::CacheOperation;
use super::types::PartitionId;
use crate::cache::error::{CacheError, CacheResult};
use crate::cache::future::{CacheFuture, InvocationHandle};
use crate::store::memory::PartitionStore;

pub struct EmbeddedChannel {
    store: Arc<PartitionStore>,
    runtime: Handle,
}

impl EmbeddedChannel {
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<PartitionStore>) -> CacheResult<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|e| {
            CacheError::IllegalState(format!("embedded channel needs a tokio runtime: {}", e))
        })?;
        Ok(Arc::new(Self { store, runtime }))
    }

    pub fn store(&self) -> &Arc<PartitionStore> {
        &self.store
    }
}

#[async_trait]
impl InvocationChannel for EmbeddedChannel {
    fn invoke(
        &self,
        cache: &str,
        operation: CacheOperation,
        partition: PartitionId,
    ) -> InvocationHandle {
        let store = self.store.clone();
        let cache = cache.to_string();

        CacheFuture::spawn(&self.runtime, async move {
            if matches!(operation, CacheOperation::LoadAll { .. }) {
                tokio::task::spawn_blocking(move || store.execute(&cache, partition, operation))
                    .await
                    .map_err(CacheError::remote)?
            } else {
                store.execute(&cache, partition, operation)
            }
        })
    }
}
