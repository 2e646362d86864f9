//! Shared fixtures for the module tests.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use crate::cache::config::CacheConfig;
use crate::cache::error::{CacheError, CacheResult};
use crate::cache::future::{CacheFuture, InvocationHandle};
use crate::cache::loader::{
    CacheLoader, CacheLoaderFactory, CompletionListener, ListenerRegistration,
};
use crate::cache::proxy::CacheProxy;
use crate::cache::types::{Data, to_data};
use crate::cluster::InvocationChannel;
use crate::cluster::embedded::EmbeddedChannel;
use crate::cluster::membership::ClusterView;
use crate::cluster::partitioner::PartitionManager;
use crate::cluster::protocol::CacheOperation;
use crate::cluster::types::PartitionId;
use crate::store::memory::PartitionStore;

pub fn data<T: Serialize + ?Sized>(value: &T) -> Data {
    to_data(value).unwrap()
}

/// Embedded channel that records the name of every operation it forwards.
pub struct CountingChannel {
    inner: Arc<EmbeddedChannel>,
    operations: Mutex<Vec<&'static str>>,
}

impl CountingChannel {
    pub fn new(inner: Arc<EmbeddedChannel>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            operations: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.operations.lock().unwrap().len()
    }

    pub fn count_of(&self, operation: &str) -> usize {
        self.operations
            .lock()
            .unwrap()
            .iter()
            .filter(|name| **name == operation)
            .count()
    }
}

#[async_trait]
impl InvocationChannel for CountingChannel {
    fn invoke(
        &self,
        cache: &str,
        operation: CacheOperation,
        partition: PartitionId,
    ) -> InvocationHandle {
        self.operations.lock().unwrap().push(operation.name());
        self.inner.invoke(cache, operation, partition)
    }
}

/// Channel whose owner is never reachable.
pub struct UnreachableChannel;

#[async_trait]
impl InvocationChannel for UnreachableChannel {
    fn invoke(&self, _: &str, _: CacheOperation, _: PartitionId) -> InvocationHandle {
        CacheFuture::failed(CacheError::Remote("member unreachable".to_string()))
    }
}

/// Loader over a fixed map, optionally slow or broken.
#[derive(Default)]
pub struct InMemoryLoader {
    source: HashMap<Data, Data>,
    delay: Option<Duration>,
    failing: bool,
    pub loads: AtomicUsize,
    pub closed: AtomicBool,
}

impl InMemoryLoader {
    pub fn new(entries: &[(&str, i64)]) -> Self {
        Self {
            source: entries
                .iter()
                .map(|(key, value)| (data(*key), data(value)))
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn factory(self: &Arc<Self>) -> Arc<dyn CacheLoaderFactory> {
        let loader = self.clone();
        Arc::new(move || loader.clone() as Arc<dyn CacheLoader>)
    }
}

impl CacheLoader for InMemoryLoader {
    fn load(&self, keys: &[Data]) -> anyhow::Result<HashMap<Data, Data>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            anyhow::bail!("source unavailable");
        }
        Ok(keys
            .iter()
            .filter_map(|key| Some((key.clone(), self.source.get(key)?.clone())))
            .collect())
    }

    fn load_all_keys(&self) -> anyhow::Result<Vec<Data>> {
        Ok(self.source.keys().cloned().collect())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Completion listener that remembers the outcome it was given.
pub struct RecordingListener {
    outcome: watch::Sender<Option<CacheResult<()>>>,
    pub calls: AtomicUsize,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        let (outcome, _) = watch::channel(None);
        Arc::new(Self {
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    /// Waits until the listener was notified.
    pub async fn outcome(&self) -> CacheResult<()> {
        let mut rx = self.outcome.subscribe();
        let notified = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|o| o.is_some()))
            .await
            .expect("listener was not notified")
            .expect("listener channel closed");
        (*notified).clone().unwrap()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CompletionListener for RecordingListener {
    fn on_completion(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.send_replace(Some(Ok(())));
    }

    fn on_failure(&self, error: CacheError) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.send_replace(Some(Err(error)));
    }
}

#[derive(Default)]
pub struct CountingRegistration {
    pub released: AtomicUsize,
}

impl ListenerRegistration for CountingRegistration {
    fn deregister(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// A single-member cluster living in this process.
pub struct EmbeddedCluster {
    pub store: Arc<PartitionStore>,
    pub router: Arc<PartitionManager>,
    pub channel: Arc<CountingChannel>,
}

impl EmbeddedCluster {
    pub fn new() -> Self {
        let router = PartitionManager::new(ClusterView::standalone());
        let store = PartitionStore::new(router.clone());
        let embedded = EmbeddedChannel::new(store.clone()).unwrap();
        Self {
            store,
            router,
            channel: CountingChannel::new(embedded),
        }
    }

    /// Registers the cache on the store and opens a proxy for it.
    pub fn proxy(&self, config: CacheConfig) -> CacheProxy<String, i64> {
        self.store.create_cache(&config);
        self.attach(config)
    }

    /// Opens another proxy on an already registered cache.
    pub fn attach(&self, config: CacheConfig) -> CacheProxy<String, i64> {
        CacheProxy::new(config, self.router.clone(), self.channel.clone()).unwrap()
    }
}
