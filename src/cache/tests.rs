//! Cache Module Tests
//!
//! Drives `CacheProxy` against a single-member cluster embedded in the test
//! process.
//!
//! ## Test Scopes
//! - **Reads**: near cache population, absent markers, batched reads.
//! - **Writes**: conditional writes decided by the owner, near cache refresh.
//! - **Statistics**: counters per operation kind.
//! - **Lifecycle**: close/open/destroy transitions and the closed gate.
//! - **Load-all**: listener outcomes and how close waits for running loads.

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use crate::cache::config::{CacheConfig, NearCacheConfig};
    use crate::cache::error::CacheError;
    use crate::cache::lifecycle::{Lifecycle, LifecycleState};
    use crate::cache::load_all::{LoadAllTask, unique_keys, validate_results};
    use crate::cache::near_cache::{CachedValue, LocalNearCache, NearCache, NearCacheError};
    use crate::cache::proxy::CacheProxy;
    use crate::cache::stats::CacheStatistics;
    use crate::cluster::InvocationChannel;
    use crate::cluster::membership::ClusterView;
    use crate::cluster::partitioner::PartitionManager;
    use crate::cluster::protocol::OperationResponse;
    use crate::cluster::types::Node;
    use crate::testing::{
        CountingRegistration, EmbeddedCluster, InMemoryLoader, RecordingListener,
        UnreachableChannel, data,
    };

    fn near_cached(name: &str) -> CacheConfig {
        CacheConfig::new(name).with_near_cache(NearCacheConfig::default())
    }

    fn keys(names: &[&str]) -> HashSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    // ============================================================
    // READS
    // ============================================================

    #[tokio::test]
    async fn test_get_absent_key_caches_absent_marker() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(near_cached("users"));
        let key = "ghost".to_string();

        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert_eq!(cache.statistics().misses, 1);
        assert_eq!(
            cache.near_cache().get(&data(&key)),
            Some(CachedValue::Absent)
        );

        // Answered locally this time
        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert_eq!(cluster.channel.count_of("get"), 1);
        assert_eq!(cache.statistics().misses, 1);
        assert_eq!(cache.statistics().hits, 1);
    }

    #[tokio::test]
    async fn test_get_present_key_served_from_near_cache() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(near_cached("users"));
        let key = "alice".to_string();

        cache.put(&key, &42).await.unwrap();
        cache.near_cache().clear();

        assert_eq!(cache.get(&key).await.unwrap(), Some(42));
        assert_eq!(cache.get(&key).await.unwrap(), Some(42));
        assert_eq!(cluster.channel.count_of("get"), 1);
        assert_eq!(
            cache.near_cache().get(&data(&key)),
            Some(CachedValue::Present(data(&42i64)))
        );
    }

    #[tokio::test]
    async fn test_get_without_near_cache_always_goes_remote() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(CacheConfig::new("users"));
        let key = "alice".to_string();

        cache.put(&key, &7).await.unwrap();
        for _ in 0..3 {
            assert_eq!(cache.get(&key).await.unwrap(), Some(7));
        }

        assert_eq!(cluster.channel.count_of("get"), 3);
        assert!(cache.near_cache().is_empty());
    }

    #[tokio::test]
    async fn test_get_all_batches_remote_hits() {
        let cluster = EmbeddedCluster::new();
        let writer = cluster.proxy(CacheConfig::new("scores"));
        writer.put(&"a".to_string(), &1).await.unwrap();
        writer.put(&"b".to_string(), &2).await.unwrap();

        let reader = cluster.attach(near_cached("scores"));
        let result = reader.get_all(&keys(&["a", "b", "c"])).await.unwrap();

        let expected: HashMap<String, i64> =
            HashMap::from([("a".to_string(), 1), ("b".to_string(), 2)]);
        assert_eq!(result, expected);

        let near_cache = reader.near_cache();
        assert_eq!(
            near_cache.get(&data("a")),
            Some(CachedValue::Present(data(&1i64)))
        );
        assert_eq!(
            near_cache.get(&data("b")),
            Some(CachedValue::Present(data(&2i64)))
        );
        assert_eq!(near_cache.get(&data("c")), None);

        let stats = reader.statistics();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_get_all_answers_cached_keys_locally() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(near_cached("scores"));
        cache.put(&"a".to_string(), &1).await.unwrap();
        cache.put(&"b".to_string(), &2).await.unwrap();

        let result = cache.get_all(&keys(&["a", "b"])).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(cluster.channel.count_of("get_all"), 0);
        assert_eq!(cache.statistics().hits, 2);
    }

    #[tokio::test]
    async fn test_get_all_empty_set() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(CacheConfig::new("scores"));

        let result = cache.get_all(&HashSet::new()).await.unwrap();

        assert!(result.is_empty());
        assert_eq!(cluster.channel.count(), 0);
    }

    #[tokio::test]
    async fn test_size_counts_every_partition() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(near_cached("scores"));

        let entries: HashMap<String, i64> = (0..25).map(|i| (format!("key-{}", i), i)).collect();
        cache.put_all(&entries).await.unwrap();

        assert_eq!(cache.size().await.unwrap(), 25);
        assert_eq!(cache.statistics().puts, 25);
    }

    // ============================================================
    // WRITES
    // ============================================================

    #[tokio::test]
    async fn test_put_if_absent_ignores_stale_near_cache() {
        let cluster = EmbeddedCluster::new();
        let stale = cluster.proxy(near_cached("sessions"));
        let other = cluster.attach(CacheConfig::new("sessions"));
        let key = "token".to_string();

        // `stale` now believes the key is absent
        assert_eq!(stale.get(&key).await.unwrap(), None);
        other.put(&key, &1).await.unwrap();

        assert!(!stale.put_if_absent(&key, &2).await.unwrap());
        assert_eq!(stale.near_cache().get(&data(&key)), None);
        assert_eq!(stale.get(&key).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_put_if_absent_stores_new_key() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(near_cached("sessions"));
        let key = "token".to_string();

        assert!(cache.put_if_absent(&key, &5).await.unwrap());
        assert!(!cache.put_if_absent(&key, &6).await.unwrap());
        assert_eq!(cache.get(&key).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_get_and_put_returns_previous_value() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(CacheConfig::new("counters"));
        let key = "visits".to_string();

        assert_eq!(cache.get_and_put(&key, &1).await.unwrap(), None);
        assert_eq!(cache.get_and_put(&key, &2).await.unwrap(), Some(1));
        assert_eq!(cache.get(&key).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_replace_variants() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(near_cached("counters"));
        let key = "visits".to_string();

        assert!(!cache.replace(&key, &1).await.unwrap());
        assert_eq!(cache.get(&key).await.unwrap(), None);

        cache.put(&key, &1).await.unwrap();
        assert!(cache.replace(&key, &2).await.unwrap());
        assert!(!cache.replace_if_equals(&key, &1, &3).await.unwrap());
        assert!(cache.replace_if_equals(&key, &2, &3).await.unwrap());
        assert_eq!(cache.get_and_replace(&key, &4).await.unwrap(), Some(3));
        assert_eq!(cache.get(&key).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_remove_variants() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(near_cached("counters"));
        let key = "visits".to_string();

        cache.put(&key, &10).await.unwrap();
        assert!(!cache.remove_if_equals(&key, &11).await.unwrap());
        assert!(cache.remove_if_equals(&key, &10).await.unwrap());
        assert!(!cache.remove(&key).await.unwrap());

        cache.put(&key, &12).await.unwrap();
        assert_eq!(cache.get_and_remove(&key).await.unwrap(), Some(12));
        assert_eq!(cache.get_and_remove(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_marks_key_absent_locally() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(near_cached("counters"));
        let key = "visits".to_string();

        cache.put(&key, &1).await.unwrap();
        assert!(cache.remove(&key).await.unwrap());
        assert_eq!(
            cache.near_cache().get(&data(&key)),
            Some(CachedValue::Absent)
        );

        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert_eq!(cluster.channel.count_of("get"), 0);
    }

    #[tokio::test]
    async fn test_async_handles_resolve() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(near_cached("async"));
        let key = "k".to_string();

        let put = cache.put_async(&key, &9).unwrap();
        put.await.unwrap();

        let get = cache.get_async(&key).unwrap();
        assert_eq!(get.await.unwrap(), Some(9));

        let removed = cache.remove_async(&key).unwrap();
        assert!(removed.await.unwrap());
    }

    #[tokio::test]
    async fn test_remote_failure_fails_handle_not_call() {
        let router = PartitionManager::new(ClusterView::standalone());
        let cache: CacheProxy<String, i64> =
            CacheProxy::new(near_cached("offline"), router, Arc::new(UnreachableChannel))
                .unwrap();
        let key = "k".to_string();

        let handle = cache.get_async(&key).unwrap();
        let err = handle.await.unwrap_err();
        assert_eq!(err, CacheError::Remote("member unreachable".to_string()));

        // A failed read must not leave anything behind locally
        assert!(cache.near_cache().is_empty());
        assert_eq!(cache.statistics().misses, 0);
    }

    // ============================================================
    // STATISTICS
    // ============================================================

    #[tokio::test]
    async fn test_statistics_counters() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(CacheConfig::new("stats"));

        cache.put(&"a".to_string(), &1).await.unwrap();
        cache.put(&"b".to_string(), &2).await.unwrap();
        cache.get(&"a".to_string()).await.unwrap();
        cache.get(&"missing".to_string()).await.unwrap();
        cache.remove(&"a".to_string()).await.unwrap();
        cache.remove(&"missing".to_string()).await.unwrap();

        let stats = cache.statistics();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.puts, 2);
        assert_eq!(stats.removals, 1);
        assert_eq!(stats.gets(), 2);
        assert_eq!(stats.hit_percentage(), 50.0);
        assert_eq!(stats.miss_percentage(), 50.0);
    }

    #[tokio::test]
    async fn test_statistics_disabled() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(CacheConfig::new("stats").with_statistics(false));

        cache.put(&"a".to_string(), &1).await.unwrap();
        cache.get(&"a".to_string()).await.unwrap();
        cache.get(&"b".to_string()).await.unwrap();

        let stats = cache.statistics();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.puts, 0);
    }

    #[test]
    fn test_statistics_averages() {
        let stats = CacheStatistics::new();
        let empty = stats.snapshot();
        assert_eq!(empty.hit_percentage(), 0.0);
        assert_eq!(empty.average_get_time(), Duration::ZERO);

        stats.increase_hits(3);
        stats.increase_misses(1);
        stats.add_get_time(Duration::from_millis(40));
        stats.increase_puts(2);
        stats.add_put_time(Duration::from_millis(10));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hit_percentage(), 75.0);
        assert_eq!(snapshot.average_get_time(), Duration::from_millis(10));
        assert_eq!(snapshot.average_put_time(), Duration::from_millis(5));
    }

    // ============================================================
    // NEAR CACHE
    // ============================================================

    #[test]
    fn test_near_cache_rejects_new_keys_when_full() {
        let near_cache = LocalNearCache::new(1);
        near_cache
            .put(data("a"), CachedValue::Present(data(&1i64)))
            .unwrap();

        let err = near_cache.put(data("b"), CachedValue::Absent).unwrap_err();
        assert_eq!(err, NearCacheError::Full { max_size: 1 });

        // Existing keys can still be refreshed
        near_cache.put(data("a"), CachedValue::Absent).unwrap();
        assert_eq!(near_cache.get(&data("a")), Some(CachedValue::Absent));
        assert_eq!(near_cache.len(), 1);
    }

    #[tokio::test]
    async fn test_full_near_cache_does_not_fail_reads() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(CacheConfig::new("tiny").with_near_cache(NearCacheConfig {
            max_size: 1,
        }));

        cache.put(&"a".to_string(), &1).await.unwrap();
        cache.put(&"b".to_string(), &2).await.unwrap();

        assert_eq!(cache.get(&"b".to_string()).await.unwrap(), Some(2));
        assert_eq!(cache.near_cache().len(), 1);
    }

    // ============================================================
    // LIFECYCLE
    // ============================================================

    #[test]
    fn test_lifecycle_transitions() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Open);
        assert!(!lifecycle.try_open().unwrap());

        assert!(lifecycle.try_close());
        assert!(!lifecycle.try_close());
        assert!(lifecycle.ensure_open("c").unwrap_err().is_illegal_state());

        assert!(lifecycle.try_open().unwrap());
        assert!(lifecycle.try_destroy());
        assert!(!lifecycle.try_destroy());
        assert!(lifecycle.is_closed());
        assert!(lifecycle.try_open().unwrap_err().is_illegal_state());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let cluster = EmbeddedCluster::new();
        let result: Result<CacheProxy<String, i64>, _> = CacheProxy::new(
            CacheConfig::new(""),
            cluster.router.clone(),
            cluster.channel.clone(),
        );

        assert!(result.err().unwrap().is_invalid_argument());
    }

    #[tokio::test]
    async fn test_operations_fail_after_close() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(near_cached("closing"));
        let key = "k".to_string();
        cache.put(&key, &1).await.unwrap();
        let sent = cluster.channel.count();

        cache.close().await.unwrap();

        assert!(cache.is_closed());
        assert!(cache.get(&key).await.unwrap_err().is_illegal_state());
        assert!(cache.put_async(&key, &2).err().unwrap().is_illegal_state());
        assert!(cache.size().await.unwrap_err().is_illegal_state());
        assert_eq!(cluster.channel.count(), sent);
    }

    #[tokio::test]
    async fn test_close_releases_resources_once() {
        let cluster = EmbeddedCluster::new();
        let loader = Arc::new(InMemoryLoader::new(&[]));
        let cache = cluster.proxy(near_cached("closing").with_loader_factory(loader.factory()));
        let registration = Arc::new(CountingRegistration::default());
        cache.register_listener(registration.clone()).unwrap();
        cache.put(&"k".to_string(), &1).await.unwrap();

        cache.close().await.unwrap();
        cache.close().await.unwrap();

        assert!(loader.closed.load(Ordering::SeqCst));
        assert_eq!(registration.released.load(Ordering::SeqCst), 1);
        assert!(cache.near_cache().is_empty());
        assert!(!cache.is_destroyed());
    }

    #[tokio::test]
    async fn test_deregister_listener() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(CacheConfig::new("listeners"));
        let registration = Arc::new(CountingRegistration::default());

        let id = cache.register_listener(registration.clone()).unwrap();
        assert!(cache.deregister_listener(&id));
        assert!(!cache.deregister_listener(&id));

        cache.close().await.unwrap();
        assert_eq!(registration.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reopen_after_close() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(near_cached("reopen"));
        let key = "k".to_string();
        cache.put(&key, &1).await.unwrap();

        cache.close().await.unwrap();
        cache.open().unwrap();

        assert!(!cache.is_closed());
        assert_eq!(cache.get(&key).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_destroy_tears_down_once() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(near_cached("doomed"));
        cache.put(&"k".to_string(), &1).await.unwrap();

        cache.close().await.unwrap();
        cache.destroy().await.unwrap();
        cache.destroy().await.unwrap();

        assert!(cache.is_destroyed());
        assert!(cache.is_closed());
        assert_eq!(cluster.channel.count_of("destroy"), 1);
        assert!(!cluster.store.has_cache("doomed"));
        assert!(cache.near_cache().is_empty());
    }

    #[tokio::test]
    async fn test_destroyed_cache_cannot_reopen() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(CacheConfig::new("doomed"));

        cache.destroy().await.unwrap();

        assert!(cache.open().unwrap_err().is_illegal_state());
        assert!(
            cache
                .get(&"k".to_string())
                .await
                .unwrap_err()
                .is_illegal_state()
        );
        assert!(
            cache
                .load_all(&[], true, None)
                .unwrap_err()
                .is_illegal_state()
        );
    }

    #[tokio::test]
    async fn test_destroy_reports_remote_failure() {
        let router = PartitionManager::new(ClusterView::standalone());
        let cache: CacheProxy<String, i64> =
            CacheProxy::new(CacheConfig::new("offline"), router, Arc::new(UnreachableChannel))
                .unwrap();

        let err = cache.destroy().await.unwrap_err();

        assert_eq!(err, CacheError::Remote("member unreachable".to_string()));
        assert!(cache.is_destroyed());
    }

    // ============================================================
    // LOAD-ALL
    // ============================================================

    #[tokio::test]
    async fn test_load_all_without_loader_completes_immediately() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(CacheConfig::new("plain"));
        let listener = RecordingListener::new();

        cache.load_all(&[], true, Some(listener.clone())).unwrap();

        assert_eq!(listener.calls(), 1);
        assert_eq!(listener.outcome().await, Ok(()));
        assert_eq!(cluster.channel.count_of("load_all"), 0);
    }

    #[tokio::test]
    async fn test_load_all_with_nothing_to_load_completes_once() {
        let cluster = EmbeddedCluster::new();
        let loader = Arc::new(InMemoryLoader::new(&[]));
        let cache = cluster.proxy(CacheConfig::new("empty").with_loader_factory(loader.factory()));
        let listener = RecordingListener::new();

        cache.load_all(&[], true, Some(listener.clone())).unwrap();

        assert_eq!(listener.outcome().await, Ok(()));
        cache.close().await.unwrap();
        assert_eq!(listener.calls(), 1);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_load_all_every_key() {
        let cluster = EmbeddedCluster::new();
        let loader = Arc::new(InMemoryLoader::new(&[("a", 1), ("b", 2), ("c", 3)]));
        let cache = cluster.proxy(CacheConfig::new("books").with_loader_factory(loader.factory()));
        let listener = RecordingListener::new();

        cache.load_all(&[], false, Some(listener.clone())).unwrap();

        assert_eq!(listener.outcome().await, Ok(()));
        assert_eq!(cache.size().await.unwrap(), 3);
        assert_eq!(cache.get(&"b".to_string()).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_load_all_respects_existing_values() {
        let cluster = EmbeddedCluster::new();
        let loader = Arc::new(InMemoryLoader::new(&[("a", 1), ("b", 2)]));
        let cache = cluster.proxy(CacheConfig::new("books").with_loader_factory(loader.factory()));
        let wanted = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        cache.put(&"a".to_string(), &100).await.unwrap();

        let listener = RecordingListener::new();
        cache.load_all(&wanted, false, Some(listener.clone())).unwrap();
        assert_eq!(listener.outcome().await, Ok(()));
        assert_eq!(cache.get(&"a".to_string()).await.unwrap(), Some(100));
        assert_eq!(cache.get(&"b".to_string()).await.unwrap(), Some(2));

        let listener = RecordingListener::new();
        cache.load_all(&wanted, true, Some(listener.clone())).unwrap();
        assert_eq!(listener.outcome().await, Ok(()));
        assert_eq!(cache.get(&"a".to_string()).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_load_all_failure_reaches_listener() {
        let cluster = EmbeddedCluster::new();
        let loader = Arc::new(InMemoryLoader::new(&[("a", 1)]).failing());
        let cache = cluster.proxy(CacheConfig::new("books").with_loader_factory(loader.factory()));
        let listener = RecordingListener::new();

        cache
            .load_all(&["a".to_string()], false, Some(listener.clone()))
            .unwrap();

        let err = listener.outcome().await.unwrap_err();
        assert!(matches!(err, CacheError::LoadFailure { .. }));
        assert_eq!(listener.calls(), 1);
    }

    #[tokio::test]
    async fn test_close_waits_for_running_load_all() {
        let cluster = EmbeddedCluster::new();
        let loader =
            Arc::new(InMemoryLoader::new(&[("a", 1)]).with_delay(Duration::from_millis(200)));
        let cache = cluster.proxy(CacheConfig::new("books").with_loader_factory(loader.factory()));
        let listener = RecordingListener::new();

        cache
            .load_all(&["a".to_string()], false, Some(listener.clone()))
            .unwrap();
        assert_eq!(cache.pending_load_tasks(), 1);

        cache.close().await.unwrap();

        assert_eq!(cache.pending_load_tasks(), 0);
        assert_eq!(listener.outcome().await, Ok(()));
        assert_eq!(cluster.store.local_entries("books").len(), 1);
    }

    #[tokio::test]
    async fn test_close_surfaces_failed_load_all() {
        let cluster = EmbeddedCluster::new();
        let loader = Arc::new(
            InMemoryLoader::new(&[("a", 1)])
                .with_delay(Duration::from_millis(200))
                .failing(),
        );
        let cache = cluster.proxy(CacheConfig::new("books").with_loader_factory(loader.factory()));

        cache.load_all(&["a".to_string()], false, None).unwrap();
        let err = cache.close().await.unwrap_err();

        match err {
            CacheError::AggregatedShutdown { failures, first } => {
                assert_eq!(failures, 1);
                assert!(matches!(*first, CacheError::LoadFailure { .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(cache.pending_load_tasks(), 0);

        // Already closed: nothing left to report
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_gives_up_on_slow_load_all() {
        let cluster = EmbeddedCluster::new();
        let loader =
            Arc::new(InMemoryLoader::new(&[("a", 1)]).with_delay(Duration::from_millis(500)));
        let cache = cluster.proxy(
            CacheConfig::new("books")
                .with_loader_factory(loader.factory())
                .with_close_timeout(Duration::from_millis(50)),
        );

        cache.load_all(&["a".to_string()], false, None).unwrap();
        let err = cache.close().await.unwrap_err();

        match err {
            CacheError::AggregatedShutdown { failures, first } => {
                assert_eq!(failures, 1);
                assert!(matches!(*first, CacheError::TaskTimedOut { .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(cache.is_closed());

        // The abandoned load keeps running and still leaves the pending set
        assert_eq!(cache.pending_load_tasks(), 1);
        tokio::time::timeout(Duration::from_secs(5), async {
            while cache.pending_load_tasks() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(cluster.store.local_entries("books").len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_close_reports_failures_once() {
        let cluster = EmbeddedCluster::new();
        let loader = Arc::new(
            InMemoryLoader::new(&[("a", 1)])
                .with_delay(Duration::from_millis(100))
                .failing(),
        );
        let cache = cluster.proxy(CacheConfig::new("books").with_loader_factory(loader.factory()));
        cache.load_all(&["a".to_string()], false, None).unwrap();

        let (first, second) = tokio::join!(cache.close(), cache.close());

        let failed = [&first, &second].iter().filter(|r| r.is_err()).count();
        assert_eq!(failed, 1);
        assert!(cache.is_closed());
        assert_eq!(cache.pending_load_tasks(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_destroy_tears_down_once() {
        let cluster = EmbeddedCluster::new();
        let cache = cluster.proxy(near_cached("doomed"));
        cache.put(&"k".to_string(), &1).await.unwrap();

        let (first, second) = tokio::join!(cache.destroy(), cache.destroy());

        assert_eq!(first, Ok(()));
        assert_eq!(second, Ok(()));
        assert!(cache.is_destroyed());
        assert_eq!(cluster.channel.count_of("destroy"), 1);
        assert!(!cluster.store.has_cache("doomed"));
    }

    #[test]
    fn test_load_all_groups_keys_by_owner_at_submission() {
        let membership = ClusterView::with_members(
            Node::new(SocketAddr::from(([127, 0, 0, 1], 6101))),
            vec![
                Node::new(SocketAddr::from(([127, 0, 0, 1], 6102))),
                Node::new(SocketAddr::from(([127, 0, 0, 1], 6103))),
            ],
        );
        let router = PartitionManager::new(membership.clone());
        let channel: Arc<dyn InvocationChannel> = Arc::new(UnreachableChannel);

        let everything =
            LoadAllTask::new("c".to_string(), vec![], false, None, router.as_ref(), channel.clone());
        let single = LoadAllTask::new(
            "c".to_string(),
            vec![data("a")],
            false,
            None,
            router.as_ref(),
            channel,
        );
        for node in membership.get_alive_members() {
            membership.mark_dead(&node.id);
        }

        assert_eq!(everything.owner_count(), 3);
        assert_eq!(single.owner_count(), 1);
    }

    #[test]
    fn test_validate_results_reports_lowest_failed_partition() {
        let results = vec![
            (7, Err(CacheError::Remote("timeout".to_string()))),
            (2, Ok(OperationResponse::Done)),
            (
                4,
                Err(CacheError::LoadFailure {
                    partition: 4,
                    cause: "disk".to_string(),
                }),
            ),
        ];
        assert_eq!(
            validate_results(results),
            Err(CacheError::LoadFailure {
                partition: 4,
                cause: "disk".to_string(),
            })
        );

        let wrapped = validate_results(vec![(3, Err(CacheError::Remote("gone".to_string())))]);
        assert!(matches!(wrapped, Err(CacheError::LoadFailure { partition: 3, .. })));

        assert_eq!(validate_results(vec![(0, Ok(OperationResponse::Done))]), Ok(()));
    }

    #[test]
    fn test_unique_keys_keeps_first_occurrence() {
        let keys = vec![data("b"), data("a"), data("b"), data("c"), data("a")];
        assert_eq!(unique_keys(keys), vec![data("b"), data("a"), data("c")]);
    }
}
