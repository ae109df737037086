//! Spawned work scoped to the caller.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::{JoinError, JoinHandle};

/// A spawned task that is aborted when its handle is dropped, so it never
/// outlives the future that spawned it.
pub struct ScopedTask<T> {
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> ScopedTask<T> {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }
}

impl<T> ScopedTask<T> {
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl<T> Future for ScopedTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

impl<T> Drop for ScopedTask<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
