use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use super::merge::{CacheMergePolicy, PassThroughMergePolicy};
use crate::cache::config::CacheConfig;
use crate::cache::error::{CacheError, CacheResult};
use crate::cache::loader::CacheLoader;
use crate::cache::types::{CacheEntryView, Data, now_ms};
use crate::cluster::PartitionRouter;
use crate::cluster::protocol::{CacheOperation, OperationResponse};
use crate::cluster::types::PartitionId;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Data,
    hits: u64,
    created_at: u64,
}

impl StoredEntry {
    fn new(value: Data) -> Self {
        Self {
            value,
            hits: 0,
            created_at: now_ms(),
        }
    }

    fn view(&self, key: &Data) -> CacheEntryView {
        CacheEntryView {
            key: key.clone(),
            value: self.value.clone(),
            hits: self.hits,
            created_at: self.created_at,
        }
    }
}

/// Data and plug-ins of one cache on this member.
struct CacheRecordStore {
    /// Structure: `Partition ID -> Key -> Entry`.
    partitions: DashMap<PartitionId, Arc<DashMap<Data, StoredEntry>>>,
    loader: Option<Arc<dyn CacheLoader>>,
    merge_policy: Arc<dyn CacheMergePolicy>,
}

impl CacheRecordStore {
    fn new(loader: Option<Arc<dyn CacheLoader>>, merge_policy: Arc<dyn CacheMergePolicy>) -> Self {
        Self {
            partitions: DashMap::new(),
            loader,
            merge_policy,
        }
    }

    /// Detaches the partition map so the outer shard lock is not held while
    /// the operation runs.
    fn partition(&self, partition: PartitionId) -> Arc<DashMap<Data, StoredEntry>> {
        self.partitions.entry(partition).or_default().clone()
    }
}

impl Default for CacheRecordStore {
    fn default() -> Self {
        Self::new(None, Arc::new(PassThroughMergePolicy))
    }
}

/// Storage engine of a partition owner.
///
/// Executes every [`CacheOperation`] for the partitions this member owns.
/// Per-key operations go through the map's entry API, so a conditional write
/// compares and swaps under the same shard lock.
pub struct PartitionStore {
    caches: DashMap<String, Arc<CacheRecordStore>>,
    router: Arc<dyn PartitionRouter>,
}

impl PartitionStore {
    pub fn new(router: Arc<dyn PartitionRouter>) -> Arc<Self> {
        Arc::new(Self {
            caches: DashMap::new(),
            router,
        })
    }

    /// Registers a cache with its loader and merge policy. Caches that were
    /// never registered are created on first use without a loader.
    pub fn create_cache(&self, config: &CacheConfig) {
        let loader = config.loader_factory.as_ref().map(|factory| factory.create());
        let record_store = CacheRecordStore::new(loader, config.merge_policy.clone());
        if let Some(previous) = self
            .caches
            .insert(config.name.clone(), Arc::new(record_store))
            && let Some(loader) = &previous.loader
        {
            loader.close();
        }
        tracing::info!("Created cache '{}'", config.name);
    }

    fn record_store(&self, cache: &str) -> Arc<CacheRecordStore> {
        self.caches
            .entry(cache.to_string())
            .or_insert_with(|| Arc::new(CacheRecordStore::default()))
            .clone()
    }

    pub fn execute(
        &self,
        cache: &str,
        partition: PartitionId,
        operation: CacheOperation,
    ) -> CacheResult<OperationResponse> {
        tracing::debug!(
            "Executing {} on cache '{}' partition {}",
            operation.name(),
            cache,
            partition
        );

        if let CacheOperation::Destroy { .. } = operation {
            self.destroy_cache(cache);
            return Ok(OperationResponse::Done);
        }

        let record_store = self.record_store(cache);
        let partition_map = record_store.partition(partition);

        let response = match operation {
            CacheOperation::Get { key } => {
                let value = partition_map.get_mut(&key).map(|mut entry| {
                    entry.hits += 1;
                    entry.value.clone()
                });
                OperationResponse::Value(value)
            }
            CacheOperation::GetAll { keys } => {
                let entries = keys
                    .into_iter()
                    .filter_map(|key| {
                        let value = partition_map.get_mut(&key).map(|mut entry| {
                            entry.hits += 1;
                            entry.value.clone()
                        })?;
                        Some((key, value))
                    })
                    .collect();
                OperationResponse::Entries(entries)
            }
            CacheOperation::Put {
                key,
                value,
                return_old,
            } => {
                let old = match partition_map.entry(key) {
                    Entry::Occupied(mut occupied) => {
                        let old = std::mem::replace(&mut occupied.get_mut().value, value);
                        Some(old)
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(StoredEntry::new(value));
                        None
                    }
                };
                if return_old {
                    OperationResponse::Value(old)
                } else {
                    OperationResponse::Done
                }
            }
            CacheOperation::PutIfAbsent { key, value } => match partition_map.entry(key) {
                Entry::Occupied(_) => OperationResponse::Flag(false),
                Entry::Vacant(vacant) => {
                    vacant.insert(StoredEntry::new(value));
                    OperationResponse::Flag(true)
                }
            },
            CacheOperation::Replace {
                key,
                expected,
                value,
                return_old,
            } => {
                let old = match partition_map.entry(key) {
                    Entry::Occupied(mut occupied) => {
                        let matches = expected
                            .as_ref()
                            .is_none_or(|expected| occupied.get().value == *expected);
                        if matches {
                            Some(std::mem::replace(&mut occupied.get_mut().value, value))
                        } else {
                            None
                        }
                    }
                    Entry::Vacant(_) => None,
                };
                if return_old {
                    OperationResponse::Value(old)
                } else {
                    OperationResponse::Flag(old.is_some())
                }
            }
            CacheOperation::Remove {
                key,
                expected,
                return_old,
            } => {
                let old = match partition_map.entry(key) {
                    Entry::Occupied(occupied) => {
                        let matches = expected
                            .as_ref()
                            .is_none_or(|expected| occupied.get().value == *expected);
                        if matches {
                            Some(occupied.remove().value)
                        } else {
                            None
                        }
                    }
                    Entry::Vacant(_) => None,
                };
                if return_old {
                    OperationResponse::Value(old)
                } else {
                    OperationResponse::Flag(old.is_some())
                }
            }
            CacheOperation::Size => OperationResponse::Size(partition_map.len() as u64),
            CacheOperation::LoadAll {
                keys,
                replace_existing_values,
            } => {
                self.load_partition(
                    cache,
                    &record_store,
                    &partition_map,
                    partition,
                    keys,
                    replace_existing_values,
                )?;
                OperationResponse::Done
            }
            CacheOperation::Destroy { .. } => OperationResponse::Done,
        };

        Ok(response)
    }

    /// Loads the keys of `partition` from the cache's loader. A cache that was
    /// registered without a loader, or never registered, fails the load.
    fn load_partition(
        &self,
        cache: &str,
        record_store: &CacheRecordStore,
        partition_map: &DashMap<Data, StoredEntry>,
        partition: PartitionId,
        keys: Vec<Data>,
        replace_existing_values: bool,
    ) -> CacheResult<()> {
        let Some(loader) = record_store.loader.clone() else {
            tracing::warn!("Load-all on cache '{}' without a loader", cache);
            return Err(CacheError::LoadFailure {
                partition,
                cause: format!("no loader registered for cache '{}' on this member", cache),
            });
        };

        let load_failure = |e: anyhow::Error| CacheError::LoadFailure {
            partition,
            cause: e.to_string(),
        };

        let candidates = if keys.is_empty() {
            loader.load_all_keys().map_err(load_failure)?
        } else {
            keys
        };

        let owned: Vec<Data> = candidates
            .into_iter()
            .filter(|key| self.router.partition_of(key) == partition)
            .filter(|key| replace_existing_values || !partition_map.contains_key(key))
            .collect();
        if owned.is_empty() {
            return Ok(());
        }

        let loaded = loader.load(&owned).map_err(load_failure)?;
        let mut stored = 0usize;
        for (key, value) in loaded {
            if self.router.partition_of(&key) != partition {
                continue;
            }
            if replace_existing_values {
                partition_map.insert(key, StoredEntry::new(value));
                stored += 1;
            } else if let Entry::Vacant(vacant) = partition_map.entry(key) {
                vacant.insert(StoredEntry::new(value));
                stored += 1;
            }
        }

        tracing::debug!("Loaded {} entries into partition {}", stored, partition);
        Ok(())
    }

    pub fn destroy_cache(&self, cache: &str) -> bool {
        match self.caches.remove(cache) {
            Some((_, record_store)) => {
                if let Some(loader) = &record_store.loader {
                    loader.close();
                }
                tracing::info!("Destroyed cache '{}' on this member", cache);
                true
            }
            None => false,
        }
    }

    pub fn has_cache(&self, cache: &str) -> bool {
        self.caches.contains_key(cache)
    }

    /// Helper for Anti-Entropy: dumps all entries of a partition.
    pub fn dump_partition(&self, cache: &str, partition: PartitionId) -> Vec<CacheEntryView> {
        let Some(record_store) = self.caches.get(cache).map(|entry| entry.value().clone()) else {
            return Vec::new();
        };
        let mut entries = Vec::new();
        if let Some(partition_map) = record_store.partitions.get(&partition) {
            for entry in partition_map.iter() {
                entries.push(entry.value().view(entry.key()));
            }
        }
        entries
    }

    /// Applies entries received from a peer, resolving each key that already
    /// exists through the cache's merge policy.
    pub fn apply_partition_entries(
        &self,
        cache: &str,
        partition: PartitionId,
        entries: Vec<CacheEntryView>,
    ) {
        let record_store = self.record_store(cache);
        let partition_map = record_store.partition(partition);

        for incoming in entries {
            match partition_map.entry(incoming.key.clone()) {
                Entry::Occupied(mut occupied) => {
                    let existing = occupied.get().view(&incoming.key);
                    let chosen =
                        record_store
                            .merge_policy
                            .merge(cache, &incoming, Some(&existing));
                    if chosen != existing.value {
                        let entry = occupied.get_mut();
                        entry.value = chosen;
                        entry.hits = incoming.hits.max(existing.hits);
                    }
                }
                Entry::Vacant(vacant) => {
                    let chosen = record_store.merge_policy.merge(cache, &incoming, None);
                    vacant.insert(StoredEntry {
                        value: chosen,
                        hits: incoming.hits,
                        created_at: incoming.created_at,
                    });
                }
            }
        }
    }

    pub fn local_entries(&self, cache: &str) -> HashMap<Data, Data> {
        let mut entries = HashMap::new();
        if let Some(record_store) = self.caches.get(cache) {
            for partition_map in record_store.partitions.iter() {
                for entry in partition_map.value().iter() {
                    entries.insert(entry.key().clone(), entry.value().value.clone());
                }
            }
        }
        entries
    }

    pub fn local_cache_count(&self) -> usize {
        self.caches.len()
    }

    pub fn local_entry_count(&self) -> usize {
        self.caches
            .iter()
            .map(|cache| {
                cache
                    .value()
                    .partitions
                    .iter()
                    .map(|partition| partition.value().len())
                    .sum::<usize>()
            })
            .sum()
    }
}
