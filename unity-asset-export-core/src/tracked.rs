//! Trackable futures
//!
//! A [`TrackedFuture`] drives an async computation on the runtime and exposes
//! its settlement state through synchronous, non-blocking queries. Callers use
//! it for a best-effort fast path: reuse a finished result if there is one,
//! otherwise recompute. A query racing the settlement simply reads as a miss.

use crate::error::{ExportError, Result};
use futures::FutureExt;
use once_cell::sync::OnceCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Notify;

struct Settlement<T> {
    outcome: OnceCell<Result<T>>,
    settled: Notify,
}

/// Async result with synchronously queryable pending/fulfilled/rejected state
pub struct TrackedFuture<T> {
    inner: Arc<Settlement<T>>,
}

impl<T> Clone for TrackedFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> TrackedFuture<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Spawn `future` on the current runtime and start tracking it
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let inner = Arc::new(Settlement {
            outcome: OnceCell::new(),
            settled: Notify::new(),
        });

        let driver = Arc::clone(&inner);
        tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => Err(ExportError::TaskJoin("tracked task panicked".to_string())),
            };
            let _ = driver.outcome.set(outcome);
            driver.settled.notify_waiters();
        });

        Self { inner }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.outcome.get().is_none()
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self.inner.outcome.get(), Some(Ok(_)))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.inner.outcome.get(), Some(Err(_)))
    }

    /// The fulfilled value, if the work already succeeded
    pub fn peek(&self) -> Option<T> {
        match self.inner.outcome.get() {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Wait for settlement and return a copy of the outcome
    pub async fn wait(&self) -> Result<T> {
        loop {
            let notified = self.inner.settled.notified();
            if let Some(outcome) = self.inner.outcome.get() {
                return outcome.clone();
            }
            notified.await;
        }
    }
}
