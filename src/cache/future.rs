//! Single-resolution completion handles.
//!
//! A [`CacheFuture`] completes exactly once, with a value or a [`CacheError`].
//! The [`Completer`] half is consumed by completing it, so a second completion
//! cannot be expressed. Continuations attached with [`CacheFuture::then`] run
//! as tasks on the runtime handle passed in, never on the caller's task.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use super::error::{CacheError, CacheResult};
use crate::cluster::protocol::OperationResponse;

/// Handle for one in-flight remote operation.
pub type InvocationHandle = CacheFuture<OperationResponse>;

#[must_use = "a CacheFuture does nothing observable unless awaited"]
pub struct CacheFuture<T> {
    rx: oneshot::Receiver<CacheResult<T>>,
}

/// Completing half of a [`CacheFuture`].
pub struct Completer<T> {
    tx: oneshot::Sender<CacheResult<T>>,
}

impl<T> Completer<T> {
    /// Resolves the paired future. A dropped future simply discards the result.
    pub fn complete(self, result: CacheResult<T>) {
        let _ = self.tx.send(result);
    }
}

impl<T: Send + 'static> CacheFuture<T> {
    pub fn pending() -> (Completer<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (Completer { tx }, Self { rx })
    }

    pub fn ready(result: CacheResult<T>) -> Self {
        let (completer, future) = Self::pending();
        completer.complete(result);
        future
    }

    pub fn completed(value: T) -> Self {
        Self::ready(Ok(value))
    }

    pub fn failed(error: CacheError) -> Self {
        Self::ready(Err(error))
    }

    /// Runs `work` on `runtime` and resolves with its output.
    pub fn spawn<F>(runtime: &Handle, work: F) -> Self
    where
        F: Future<Output = CacheResult<T>> + Send + 'static,
    {
        let (completer, future) = Self::pending();
        runtime.spawn(async move {
            completer.complete(work.await);
        });
        future
    }

    /// Attaches a continuation that runs once this future resolves.
    ///
    /// The continuation runs even if the returned future is dropped, so side
    /// effects attached here (near cache refresh, statistics) always happen.
    pub fn then<U, F>(self, runtime: &Handle, continuation: F) -> CacheFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(CacheResult<T>) -> CacheResult<U> + Send + 'static,
    {
        CacheFuture::spawn(runtime, async move { continuation(self.await) })
    }
}

impl<T> Future for CacheFuture<T> {
    type Output = CacheResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(CacheError::Remote(
                "Invocation was dropped before it completed".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}
