//! Cache Proxy
//!
//! Entry point for every key/value operation on a named cache. Each operation
//! follows the same steps:
//! 1. **Gate**: fail fast unless the cache is open.
//! 2. **Validate**: serialize and check arguments before anything is sent.
//! 3. **Near cache**: plain reads are answered locally when possible.
//! 4. **Invoke**: route the key to its partition and hand the operation to the
//!    invocation channel.
//! 5. **Complete**: refresh the near cache, record statistics, resolve the
//!    caller's handle.
//!
//! Every operation is implemented once, in its `*_async` form. The awaiting
//! form just awaits that handle, so both forms share routing, near cache and
//! statistics behaviour.

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::runtime::Handle;
use uuid::Uuid;

use super::config::CacheConfig;
use super::error::{CacheError, CacheResult};
use super::future::{CacheFuture, InvocationHandle};
use super::lifecycle::{Lifecycle, PendingTasks};
use super::load_all::{LoadAllTask, unique_keys};
use super::loader::{CacheLoader, CompletionListener, ListenerRegistration};
use super::near_cache::{self, CachedValue, NearCache};
use super::stats::{CacheStatistics, StatisticsSnapshot};
use super::types::{Data, to_data, to_object};
use crate::cluster::protocol::{CacheOperation, OperationResponse};
use crate::cluster::types::PartitionId;
use crate::cluster::{InvocationChannel, PartitionRouter};

/// Collaborators shared by the proxy and the continuations it spawns.
#[derive(Clone)]
struct OperationContext {
    name: String,
    router: Arc<dyn PartitionRouter>,
    channel: Arc<dyn InvocationChannel>,
    near_cache: Arc<dyn NearCache>,
    statistics: Option<Arc<CacheStatistics>>,
    runtime: Handle,
}

impl OperationContext {
    fn invoke_on_key(&self, key: &Data, operation: CacheOperation) -> InvocationHandle {
        let partition = self.router.partition_of(key);
        self.channel.invoke(&self.name, operation, partition)
    }

    fn stats(&self) -> Option<&CacheStatistics> {
        self.statistics.as_deref()
    }

    /// The remote result is already in hand at this point, so a refused
    /// refresh is logged and dropped instead of failing the operation.
    fn refresh_near_cache(&self, key: Data, value: CachedValue) {
        if let Err(e) = self.near_cache.put(key, value) {
            tracing::debug!("Near cache refresh skipped for '{}': {}", self.name, e);
        }
    }

    fn finish_put(
        &self,
        key: Data,
        value: Data,
        return_old: bool,
        started: Instant,
        result: CacheResult<OperationResponse>,
    ) -> CacheResult<Option<Data>> {
        let old = match result.and_then(|response| {
            if return_old {
                response.into_value()
            } else {
                Ok(None)
            }
        }) {
            Ok(old) => old,
            Err(e) => {
                self.near_cache.invalidate(&key);
                return Err(e);
            }
        };

        self.refresh_near_cache(key, CachedValue::Present(value));
        if let Some(stats) = self.stats() {
            if return_old {
                if old.is_some() {
                    stats.increase_hits(1);
                } else {
                    stats.increase_misses(1);
                }
            }
            stats.increase_puts(1);
            stats.add_put_time(started.elapsed());
        }
        Ok(old)
    }
}

/// Typed proxy over one named, partitioned cache.
///
/// `K` and `V` cross the wire in serialized form; the proxy itself never
/// compares values, conditional writes are decided by the partition owner.
pub struct CacheProxy<K, V> {
    config: CacheConfig,
    ctx: OperationContext,
    statistics: Arc<CacheStatistics>,
    lifecycle: Lifecycle,
    pending: Arc<PendingTasks>,
    loader: Mutex<Option<Arc<dyn CacheLoader>>>,
    listeners: DashMap<Uuid, Arc<dyn ListenerRegistration>>,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> CacheProxy<K, V>
where
    K: Serialize + DeserializeOwned + Eq + Hash + Clone + Send + 'static,
    V: Serialize + DeserializeOwned + Send + 'static,
{
    /// Builds an open proxy. Must be called from within a tokio runtime; that
    /// runtime runs every completion continuation of this proxy.
    pub fn new(
        config: CacheConfig,
        router: Arc<dyn PartitionRouter>,
        channel: Arc<dyn InvocationChannel>,
    ) -> CacheResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            CacheError::IllegalState(format!("cache proxy needs a tokio runtime: {}", e))
        })?;

        let statistics = Arc::new(CacheStatistics::new());
        let ctx = OperationContext {
            name: config.name.clone(),
            router,
            channel,
            near_cache: near_cache::from_config(config.near_cache.as_ref()),
            statistics: config.statistics_enabled.then(|| statistics.clone()),
            runtime,
        };

        let proxy = Self {
            config,
            ctx,
            statistics,
            lifecycle: Lifecycle::new(),
            pending: PendingTasks::new(),
            loader: Mutex::new(None),
            listeners: DashMap::new(),
            _types: PhantomData,
        };
        proxy.init_loader();
        Ok(proxy)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn near_cache(&self) -> Arc<dyn NearCache> {
        self.ctx.near_cache.clone()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.statistics.snapshot()
    }

    pub fn pending_load_tasks(&self) -> usize {
        self.pending.len()
    }

    fn ensure_open(&self) -> CacheResult<()> {
        self.lifecycle.ensure_open(&self.config.name)
    }

    fn key_data(&self, key: &K) -> CacheResult<Data> {
        let data = to_data(key)?;
        if data.is_empty() {
            return Err(CacheError::InvalidArgument(
                "key must not serialize to an empty byte sequence".to_string(),
            ));
        }
        Ok(data)
    }

    // ============================================================
    // READS
    // ============================================================

    pub fn get_async(&self, key: &K) -> CacheResult<CacheFuture<Option<V>>> {
        let started = Instant::now();
        self.ensure_open()?;
        let key_data = self.key_data(key)?;

        if let Some(cached) = self.ctx.near_cache.get(&key_data) {
            if let Some(stats) = self.ctx.stats() {
                stats.increase_hits(1);
            }
            return Ok(CacheFuture::ready(match cached {
                CachedValue::Present(value) => to_object(&value).map(Some),
                CachedValue::Absent => Ok(None),
            }));
        }

        let handle = self.ctx.invoke_on_key(
            &key_data,
            CacheOperation::Get {
                key: key_data.clone(),
            },
        );
        let ctx = self.ctx.clone();
        Ok(handle.then(&self.ctx.runtime, move |result| {
            let value = result?.into_value()?;
            let cached = match &value {
                Some(value) => CachedValue::Present(value.clone()),
                None => CachedValue::Absent,
            };
            ctx.refresh_near_cache(key_data, cached);

            if let Some(stats) = ctx.stats() {
                if value.is_some() {
                    stats.increase_hits(1);
                } else {
                    stats.increase_misses(1);
                }
                stats.add_get_time(started.elapsed());
            }
            value.map(|value| to_object(&value)).transpose()
        }))
    }

    pub async fn get(&self, key: &K) -> CacheResult<Option<V>> {
        self.get_async(key)?.await
    }

    /// Keys found in the near cache are answered locally; the rest are
    /// fetched in one request per partition. A key missing from the remote
    /// answer is left out of the result and is not cached as absent.
    pub fn get_all_async(&self, keys: &HashSet<K>) -> CacheResult<CacheFuture<HashMap<K, V>>> {
        let started = Instant::now();
        self.ensure_open()?;
        if keys.is_empty() {
            return Ok(CacheFuture::completed(HashMap::new()));
        }

        let mut result = HashMap::with_capacity(keys.len());
        let mut by_partition: HashMap<PartitionId, Vec<Data>> = HashMap::new();
        let mut near_hits = 0u64;
        for key in keys {
            let key_data = self.key_data(key)?;
            match self.ctx.near_cache.get(&key_data) {
                Some(CachedValue::Present(value)) => {
                    result.insert(key.clone(), to_object(&value)?);
                    near_hits += 1;
                }
                _ => {
                    let partition = self.ctx.router.partition_of(&key_data);
                    by_partition.entry(partition).or_default().push(key_data);
                }
            }
        }

        if let Some(stats) = self.ctx.stats() {
            stats.increase_hits(near_hits);
        }
        if by_partition.is_empty() {
            return Ok(CacheFuture::completed(result));
        }

        let partitions: Vec<PartitionId> = by_partition.keys().copied().collect();
        let ctx = self.ctx.clone();
        Ok(CacheFuture::spawn(&self.ctx.runtime, async move {
            let factory = move |partition: PartitionId| CacheOperation::GetAll {
                keys: by_partition.get(&partition).cloned().unwrap_or_default(),
            };
            let responses: BTreeMap<PartitionId, CacheResult<OperationResponse>> = ctx
                .channel
                .invoke_on_partitions(&ctx.name, &factory, &partitions)
                .await
                .into_iter()
                .collect();

            let mut fetched = 0u64;
            for (_, response) in responses {
                for (key_data, value_data) in response?.into_entries()? {
                    let key: K = to_object(&key_data)?;
                    let value: V = to_object(&value_data)?;
                    ctx.refresh_near_cache(key_data, CachedValue::Present(value_data));
                    result.insert(key, value);
                    fetched += 1;
                }
            }

            // The owners answer per batch, not per key, so only hits are known.
            if let Some(stats) = ctx.stats() {
                stats.increase_hits(fetched);
                stats.add_get_time(started.elapsed());
            }
            Ok(result)
        }))
    }

    pub async fn get_all(&self, keys: &HashSet<K>) -> CacheResult<HashMap<K, V>> {
        self.get_all_async(keys)?.await
    }

    /// Always answered by the owners; the near cache only holds a subset.
    pub fn size_async(&self) -> CacheResult<CacheFuture<u64>> {
        self.ensure_open()?;
        let partitions: Vec<PartitionId> = self
            .ctx
            .router
            .member_partitions()
            .into_values()
            .flatten()
            .collect();

        let ctx = self.ctx.clone();
        Ok(CacheFuture::spawn(&self.ctx.runtime, async move {
            let factory = |_: PartitionId| CacheOperation::Size;
            let responses: BTreeMap<PartitionId, CacheResult<OperationResponse>> = ctx
                .channel
                .invoke_on_partitions(&ctx.name, &factory, &partitions)
                .await
                .into_iter()
                .collect();

            let mut total = 0u64;
            for (_, response) in responses {
                total += response?.into_size()?;
            }
            Ok(total)
        }))
    }

    pub async fn size(&self) -> CacheResult<u64> {
        self.size_async()?.await
    }

    // ============================================================
    // WRITES
    // ============================================================

    fn put_internal<T, F>(
        &self,
        key: &K,
        value: &V,
        return_old: bool,
        finish: F,
    ) -> CacheResult<CacheFuture<T>>
    where
        T: Send + 'static,
        F: FnOnce(Option<V>) -> T + Send + 'static,
    {
        let started = Instant::now();
        self.ensure_open()?;
        let key_data = self.key_data(key)?;
        let value_data = to_data(value)?;

        let handle = self.ctx.invoke_on_key(
            &key_data,
            CacheOperation::Put {
                key: key_data.clone(),
                value: value_data.clone(),
                return_old,
            },
        );
        let ctx = self.ctx.clone();
        Ok(handle.then(&self.ctx.runtime, move |result| {
            let old = ctx.finish_put(key_data, value_data, return_old, started, result)?;
            let old = old.map(|old| to_object(&old)).transpose()?;
            Ok(finish(old))
        }))
    }

    pub fn put_async(&self, key: &K, value: &V) -> CacheResult<CacheFuture<()>> {
        self.put_internal(key, value, false, |_| ())
    }

    pub async fn put(&self, key: &K, value: &V) -> CacheResult<()> {
        self.put_async(key, value)?.await
    }

    pub fn get_and_put_async(&self, key: &K, value: &V) -> CacheResult<CacheFuture<Option<V>>> {
        self.put_internal(key, value, true, |old| old)
    }

    pub async fn get_and_put(&self, key: &K, value: &V) -> CacheResult<Option<V>> {
        self.get_and_put_async(key, value)?.await
    }

    /// Decided by the owner of the key. A value or absent marker held in the
    /// near cache plays no part in the outcome.
    pub fn put_if_absent_async(&self, key: &K, value: &V) -> CacheResult<CacheFuture<bool>> {
        let started = Instant::now();
        self.ensure_open()?;
        let key_data = self.key_data(key)?;
        let value_data = to_data(value)?;

        let handle = self.ctx.invoke_on_key(
            &key_data,
            CacheOperation::PutIfAbsent {
                key: key_data.clone(),
                value: value_data.clone(),
            },
        );
        let ctx = self.ctx.clone();
        Ok(handle.then(&self.ctx.runtime, move |result| {
            let saved = match result.and_then(OperationResponse::into_flag) {
                Ok(saved) => saved,
                Err(e) => {
                    ctx.near_cache.invalidate(&key_data);
                    return Err(e);
                }
            };

            if saved {
                ctx.refresh_near_cache(key_data, CachedValue::Present(value_data));
                if let Some(stats) = ctx.stats() {
                    stats.increase_puts(1);
                    stats.add_put_time(started.elapsed());
                }
            } else {
                ctx.near_cache.invalidate(&key_data);
            }
            Ok(saved)
        }))
    }

    pub async fn put_if_absent(&self, key: &K, value: &V) -> CacheResult<bool> {
        self.put_if_absent_async(key, value)?.await
    }

    /// Puts every entry one key at a time, in iteration order.
    ///
    /// Not atomic: a failure stops the remaining puts but keeps the ones
    /// already applied.
    pub fn put_all_async(&self, entries: &HashMap<K, V>) -> CacheResult<CacheFuture<()>> {
        self.ensure_open()?;
        let batch = entries
            .iter()
            .map(|(key, value)| -> CacheResult<(Data, Data)> {
                Ok((self.key_data(key)?, to_data(value)?))
            })
            .collect::<CacheResult<Vec<_>>>()?;

        let ctx = self.ctx.clone();
        Ok(CacheFuture::spawn(&self.ctx.runtime, async move {
            for (key, value) in batch {
                let started = Instant::now();
                let result = ctx
                    .invoke_on_key(
                        &key,
                        CacheOperation::Put {
                            key: key.clone(),
                            value: value.clone(),
                            return_old: false,
                        },
                    )
                    .await;
                ctx.finish_put(key, value, false, started, result)?;
            }
            Ok(())
        }))
    }

    pub async fn put_all(&self, entries: &HashMap<K, V>) -> CacheResult<()> {
        self.put_all_async(entries)?.await
    }

    fn replace_internal<T, F>(
        &self,
        key: &K,
        expected: Option<&V>,
        value: &V,
        return_old: bool,
        finish: F,
    ) -> CacheResult<CacheFuture<T>>
    where
        T: Send + 'static,
        F: FnOnce(bool, Option<V>) -> T + Send + 'static,
    {
        let started = Instant::now();
        self.ensure_open()?;
        let key_data = self.key_data(key)?;
        let expected = expected.map(|expected| to_data(expected)).transpose()?;
        let value_data = to_data(value)?;

        let handle = self.ctx.invoke_on_key(
            &key_data,
            CacheOperation::Replace {
                key: key_data.clone(),
                expected,
                value: value_data.clone(),
                return_old,
            },
        );
        let ctx = self.ctx.clone();
        Ok(handle.then(&self.ctx.runtime, move |result| {
            let outcome = result.and_then(|response| {
                if return_old {
                    response.into_value().map(|old| (old.is_some(), old))
                } else {
                    response.into_flag().map(|replaced| (replaced, None))
                }
            });
            let (replaced, old) = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    ctx.near_cache.invalidate(&key_data);
                    return Err(e);
                }
            };

            if replaced {
                ctx.refresh_near_cache(key_data, CachedValue::Present(value_data));
            } else {
                ctx.near_cache.invalidate(&key_data);
            }
            if let Some(stats) = ctx.stats() {
                if replaced {
                    stats.increase_hits(1);
                    stats.increase_puts(1);
                } else {
                    stats.increase_misses(1);
                }
                stats.add_put_time(started.elapsed());
            }

            let old = old.map(|old| to_object(&old)).transpose()?;
            Ok(finish(replaced, old))
        }))
    }

    pub fn replace_async(&self, key: &K, value: &V) -> CacheResult<CacheFuture<bool>> {
        self.replace_internal(key, None, value, false, |replaced, _| replaced)
    }

    pub async fn replace(&self, key: &K, value: &V) -> CacheResult<bool> {
        self.replace_async(key, value)?.await
    }

    /// Replaces only if the owner currently holds `old_value`.
    pub fn replace_if_equals_async(
        &self,
        key: &K,
        old_value: &V,
        new_value: &V,
    ) -> CacheResult<CacheFuture<bool>> {
        self.replace_internal(key, Some(old_value), new_value, false, |replaced, _| {
            replaced
        })
    }

    pub async fn replace_if_equals(&self, key: &K, old_value: &V, new_value: &V) -> CacheResult<bool> {
        self.replace_if_equals_async(key, old_value, new_value)?
            .await
    }

    pub fn get_and_replace_async(&self, key: &K, value: &V) -> CacheResult<CacheFuture<Option<V>>> {
        self.replace_internal(key, None, value, true, |_, old| old)
    }

    pub async fn get_and_replace(&self, key: &K, value: &V) -> CacheResult<Option<V>> {
        self.get_and_replace_async(key, value)?.await
    }

    fn remove_internal<T, F>(
        &self,
        key: &K,
        expected: Option<&V>,
        return_old: bool,
        finish: F,
    ) -> CacheResult<CacheFuture<T>>
    where
        T: Send + 'static,
        F: FnOnce(bool, Option<V>) -> T + Send + 'static,
    {
        let started = Instant::now();
        self.ensure_open()?;
        let key_data = self.key_data(key)?;
        let expected = expected.map(|expected| to_data(expected)).transpose()?;
        let conditional = expected.is_some();

        let handle = self.ctx.invoke_on_key(
            &key_data,
            CacheOperation::Remove {
                key: key_data.clone(),
                expected,
                return_old,
            },
        );
        let ctx = self.ctx.clone();
        Ok(handle.then(&self.ctx.runtime, move |result| {
            let outcome = result.and_then(|response| {
                if return_old {
                    response.into_value().map(|old| (old.is_some(), old))
                } else {
                    response.into_flag().map(|removed| (removed, None))
                }
            });
            let (removed, old) = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    ctx.near_cache.invalidate(&key_data);
                    return Err(e);
                }
            };

            // An unconditional remove leaves the key absent either way; a
            // failed conditional one says nothing about the current value.
            if removed || !conditional {
                ctx.refresh_near_cache(key_data, CachedValue::Absent);
            } else {
                ctx.near_cache.invalidate(&key_data);
            }
            if let Some(stats) = ctx.stats() {
                if return_old {
                    if removed {
                        stats.increase_hits(1);
                    } else {
                        stats.increase_misses(1);
                    }
                }
                if removed {
                    stats.increase_removals(1);
                    stats.add_remove_time(started.elapsed());
                }
            }

            let old = old.map(|old| to_object(&old)).transpose()?;
            Ok(finish(removed, old))
        }))
    }

    pub fn remove_async(&self, key: &K) -> CacheResult<CacheFuture<bool>> {
        self.remove_internal(key, None, false, |removed, _| removed)
    }

    pub async fn remove(&self, key: &K) -> CacheResult<bool> {
        self.remove_async(key)?.await
    }

    /// Removes only if the owner currently holds `old_value`.
    pub fn remove_if_equals_async(&self, key: &K, old_value: &V) -> CacheResult<CacheFuture<bool>> {
        self.remove_internal(key, Some(old_value), false, |removed, _| removed)
    }

    pub async fn remove_if_equals(&self, key: &K, old_value: &V) -> CacheResult<bool> {
        self.remove_if_equals_async(key, old_value)?.await
    }

    pub fn get_and_remove_async(&self, key: &K) -> CacheResult<CacheFuture<Option<V>>> {
        self.remove_internal(key, None, true, |_, old| old)
    }

    pub async fn get_and_remove(&self, key: &K) -> CacheResult<Option<V>> {
        self.get_and_remove_async(key)?.await
    }

    // ============================================================
    // LOAD-ALL
    // ============================================================

    /// Submits a background load of `keys` (every key the loader knows when
    /// empty) on all partition owners. The outcome goes to `listener`; this
    /// call only reports gate and argument errors.
    pub fn load_all(
        &self,
        keys: &[K],
        replace_existing_values: bool,
        listener: Option<Arc<dyn CompletionListener>>,
    ) -> CacheResult<()> {
        self.ensure_open()?;
        let keys = keys
            .iter()
            .map(|key| self.key_data(key))
            .collect::<CacheResult<Vec<Data>>>()?;

        if self.current_loader().is_none() {
            if let Some(listener) = &listener {
                listener.on_completion();
            }
            return Ok(());
        }

        let task = LoadAllTask::new(
            self.config.name.clone(),
            unique_keys(keys),
            replace_existing_values,
            listener,
            self.ctx.router.as_ref(),
            self.ctx.channel.clone(),
        );
        let owners = task.owner_count();
        let task_id = self.pending.submit(&self.ctx.runtime, "load-all", task.run());
        tracing::debug!(
            "Load-all {} submitted for '{}' across {} owner(s)",
            task_id.0,
            self.config.name,
            owners
        );
        Ok(())
    }

    // ============================================================
    // LIFECYCLE
    // ============================================================

    fn init_loader(&self) {
        let loader = self
            .config
            .loader_factory
            .as_ref()
            .map(|factory| factory.create());
        *self.loader.lock().unwrap_or_else(PoisonError::into_inner) = loader;
    }

    fn current_loader(&self) -> Option<Arc<dyn CacheLoader>> {
        self.loader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn close_loader(&self) {
        let loader = self
            .loader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(loader) = loader {
            loader.close();
        }
    }

    pub fn register_listener(&self, registration: Arc<dyn ListenerRegistration>) -> CacheResult<Uuid> {
        self.ensure_open()?;
        let id = Uuid::new_v4();
        self.listeners.insert(id, registration);
        Ok(id)
    }

    pub fn deregister_listener(&self, id: &Uuid) -> bool {
        match self.listeners.remove(id) {
            Some((_, registration)) => {
                registration.deregister();
                true
            }
            None => false,
        }
    }

    fn close_listeners(&self) {
        let ids: Vec<Uuid> = self.listeners.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.deregister_listener(&id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle.is_destroyed()
    }

    /// Closes the proxy. Only the first call does anything.
    ///
    /// Waits for each pending load-all up to the configured bound, then
    /// releases the loader, listener registrations and near cache. The cache
    /// is closed even when an error is returned; the error reports the first
    /// task that failed or outlived its bound.
    pub async fn close(&self) -> CacheResult<()> {
        if !self.lifecycle.try_close() {
            return Ok(());
        }
        tracing::info!(
            "Closing cache '{}' with {} pending load-all task(s)",
            self.config.name,
            self.pending.len()
        );

        let failures = self.pending.drain(self.config.close_timeout).await;
        for failure in &failures {
            tracing::warn!(
                "Problem while waiting for load-all tasks to complete: {}",
                failure
            );
        }

        self.close_loader();
        self.close_listeners();
        self.ctx.near_cache.clear();

        match failures.first() {
            Some(first) => Err(CacheError::AggregatedShutdown {
                failures: failures.len(),
                first: Box::new(first.clone()),
            }),
            None => Ok(()),
        }
    }

    /// Closes the proxy, then tears the cache down cluster-wide exactly once.
    ///
    /// The teardown is one request to the owner of the partition the cache
    /// name hashes to. The proxy is destroyed locally even if that request
    /// fails; its error is returned ahead of any close error.
    pub async fn destroy(&self) -> CacheResult<()> {
        let closed = self.close().await;
        if !self.lifecycle.try_destroy() {
            return closed;
        }
        tracing::info!("Destroying cache '{}'", self.config.name);

        let name_key = Data::from(self.config.name.as_str());
        let destroyed = self
            .ctx
            .invoke_on_key(&name_key, CacheOperation::Destroy { broadcast: true })
            .await;
        self.ctx.near_cache.clear();

        if let Err(e) = destroyed {
            tracing::error!("Failed to destroy cache '{}': {}", self.config.name, e);
            return Err(e);
        }
        closed
    }

    /// Reopens a closed proxy with a fresh loader instance. Cluster data is
    /// untouched.
    pub fn open(&self) -> CacheResult<()> {
        if self.lifecycle.try_open()? {
            self.init_loader();
            tracing::info!("Reopened cache '{}'", self.config.name);
        }
        Ok(())
    }
}
