use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::types::now_ms;

/// Lock-free hit/miss/latency counters of one cache proxy.
///
/// Counters are independent; a snapshot is not atomic across them.
#[derive(Debug)]
pub struct CacheStatistics {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    removals: AtomicU64,
    get_time_nanos: AtomicU64,
    put_time_nanos: AtomicU64,
    remove_time_nanos: AtomicU64,
    creation_time: u64,
}

impl CacheStatistics {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            removals: AtomicU64::new(0),
            get_time_nanos: AtomicU64::new(0),
            put_time_nanos: AtomicU64::new(0),
            remove_time_nanos: AtomicU64::new(0),
            creation_time: now_ms(),
        }
    }

    pub fn increase_hits(&self, count: u64) {
        self.hits.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increase_misses(&self, count: u64) {
        self.misses.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increase_puts(&self, count: u64) {
        self.puts.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increase_removals(&self, count: u64) {
        self.removals.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_get_time(&self, elapsed: Duration) {
        self.get_time_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn add_put_time(&self, elapsed: Duration) {
        self.put_time_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn add_remove_time(&self, elapsed: Duration) {
        self.remove_time_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            get_time_nanos: self.get_time_nanos.load(Ordering::Relaxed),
            put_time_nanos: self.put_time_nanos.load(Ordering::Relaxed),
            remove_time_nanos: self.remove_time_nanos.load(Ordering::Relaxed),
            creation_time: self.creation_time,
        }
    }
}

impl Default for CacheStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub removals: u64,
    pub get_time_nanos: u64,
    pub put_time_nanos: u64,
    pub remove_time_nanos: u64,
    /// Timestamp (ms) when the statistics were created.
    pub creation_time: u64,
}

impl StatisticsSnapshot {
    pub fn gets(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_percentage(&self) -> f64 {
        percentage(self.hits, self.gets())
    }

    pub fn miss_percentage(&self) -> f64 {
        percentage(self.misses, self.gets())
    }

    pub fn average_get_time(&self) -> Duration {
        average(self.get_time_nanos, self.gets())
    }

    pub fn average_put_time(&self) -> Duration {
        average(self.put_time_nanos, self.puts)
    }

    pub fn average_remove_time(&self) -> Duration {
        average(self.remove_time_nanos, self.removals)
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / total as f64
}

fn average(total_nanos: u64, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(total_nanos / count)
}
