//! Lifecycle state machine and background task bookkeeping.
//!
//! State moves `Open -> Closed -> Open` until a destroy, after which it stays
//! `Destroyed`. Every transition is a single compare-and-swap, so concurrent
//! callers see at most one winner per transition.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::error::{CacheError, CacheResult};
use super::types::TaskId;

const OPEN: u8 = 0;
const CLOSED: u8 = 1;
const DESTROYED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Open,
    Closed,
    Destroyed,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(OPEN),
        }
    }

    pub fn state(&self) -> LifecycleState {
        match self.state.load(Ordering::Acquire) {
            OPEN => LifecycleState::Open,
            CLOSED => LifecycleState::Closed,
            _ => LifecycleState::Destroyed,
        }
    }

    /// A destroyed cache is also closed.
    pub fn is_closed(&self) -> bool {
        self.state() != LifecycleState::Open
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == LifecycleState::Destroyed
    }

    /// The gate every data operation passes first.
    pub fn ensure_open(&self, cache_name: &str) -> CacheResult<()> {
        if self.is_closed() {
            return Err(CacheError::closed(cache_name));
        }
        Ok(())
    }

    /// `Open -> Closed`. Returns `false` if this caller did not make the move.
    pub fn try_close(&self) -> bool {
        self.state
            .compare_exchange(OPEN, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Forces any non-destroyed state to `Destroyed`. Returns `false` if the
    /// cache was already destroyed.
    pub fn try_destroy(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == DESTROYED {
                return false;
            }
            match self.state.compare_exchange(
                current,
                DESTROYED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// `Closed -> Open`. Returns `Ok(false)` when already open.
    pub fn try_open(&self) -> CacheResult<bool> {
        match self
            .state
            .compare_exchange(CLOSED, OPEN, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(true),
            Err(DESTROYED) => Err(CacheError::IllegalState(
                "Cache is already destroyed! Cannot be reopened".to_string(),
            )),
            Err(_) => Ok(false),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// `None` while the task runs, then its outcome.
type TaskOutcome = Option<CacheResult<()>>;

/// In-flight background tasks of a proxy.
///
/// A task is inserted before it starts and removed exactly once: by its own
/// completion, or by `drain` after the drain observed its outcome. Both paths
/// go through `DashMap::remove`, so whichever comes second finds nothing.
pub struct PendingTasks {
    tasks: DashMap<TaskId, watch::Receiver<TaskOutcome>>,
}

impl PendingTasks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: DashMap::new(),
        })
    }

    pub fn submit<F>(self: &Arc<Self>, runtime: &Handle, label: &str, task: F) -> TaskId
    where
        F: Future<Output = CacheResult<()>> + Send + 'static,
    {
        let task_id = TaskId::new();
        let (tx, rx) = watch::channel(None);
        self.tasks.insert(task_id.clone(), rx);

        let tracked = self.clone();
        let id = task_id.clone();
        let label = label.to_string();
        runtime.spawn(async move {
            let outcome = task.await;
            if let Err(e) = &outcome {
                tracing::warn!("Problem in {} task {}: {}", label, id.0, e);
            }
            let _ = tx.send(Some(outcome));
            tracked.remove(&id);
        });

        tracing::debug!("Submitted background task {}", task_id.0);
        task_id
    }

    /// Returns `true` if this call removed the task.
    pub fn remove(&self, task_id: &TaskId) -> bool {
        self.tasks.remove(task_id).is_some()
    }

    /// Waits up to `timeout` for each task tracked at call time.
    ///
    /// Finished tasks are removed; a task that outlives its bound keeps running
    /// and removes itself when it ends. Failures and timeouts are collected in
    /// order, none of them aborts the drain.
    pub async fn drain(&self, timeout: Duration) -> Vec<CacheError> {
        let snapshot: Vec<(TaskId, watch::Receiver<TaskOutcome>)> = self
            .tasks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut failures = Vec::new();
        for (task_id, mut rx) in snapshot {
            let waited = tokio::time::timeout(timeout, async {
                rx.wait_for(|outcome| outcome.is_some())
                    .await
                    .map(|outcome| (*outcome).clone())
            })
            .await;

            match waited {
                Ok(Ok(outcome)) => {
                    if let Some(Err(e)) = outcome {
                        failures.push(e);
                    }
                    self.remove(&task_id);
                }
                Ok(Err(_)) => {
                    failures.push(CacheError::Remote(format!(
                        "Task {} ended without reporting an outcome",
                        task_id.0
                    )));
                    self.remove(&task_id);
                }
                Err(_) => failures.push(CacheError::TaskTimedOut {
                    task: task_id.0.clone(),
                    timeout,
                }),
            }
        }
        failures
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
