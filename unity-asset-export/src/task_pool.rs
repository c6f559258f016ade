//! Bounded task pool
//!
//! A fixed number of workers drain a shared FIFO queue. Tasks may be added
//! while the pool runs; `end` tells idle workers to exit once the queue is
//! empty and waits for all of them.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use unity_asset_export_core::{ExportError, Result};

type TaskHandler<T> = Arc<dyn Fn(T, usize) -> BoxFuture<'static, Result<()>> + Send + Sync>;
type ErrorHandler<T> = Arc<dyn Fn(ExportError, T, usize) + Send + Sync>;

struct PoolShared<T> {
    queue: Mutex<VecDeque<T>>,
    wake: Notify,
    ended: AtomicBool,
}

impl<T> PoolShared<T> {
    fn pop(&self) -> Option<T> {
        self.queue.lock().ok()?.pop_front()
    }
}

/// Pool of `concurrency` workers invoking one async handler per task.
///
/// Every task is handed to exactly one worker. A failing (or panicking)
/// handler is reported through the error handler and never stops the pool.
pub struct BoundedTaskPool<T> {
    shared: Arc<PoolShared<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T> BoundedTaskPool<T>
where
    T: Clone + Send + 'static,
{
    /// Start a pool whose failures are only logged
    pub fn new<H, Fut>(concurrency: usize, handler: H) -> Self
    where
        H: Fn(T, usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::spawn(concurrency, Self::box_handler(handler), None)
    }

    /// Start a pool that reports failures as `(error, task, worker index)`
    pub fn with_error_handler<H, Fut, E>(concurrency: usize, handler: H, on_error: E) -> Self
    where
        H: Fn(T, usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
        E: Fn(ExportError, T, usize) + Send + Sync + 'static,
    {
        Self::spawn(
            concurrency,
            Self::box_handler(handler),
            Some(Arc::new(on_error)),
        )
    }

    fn box_handler<H, Fut>(handler: H) -> TaskHandler<T>
    where
        H: Fn(T, usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Arc::new(move |task: T, index: usize| handler(task, index).boxed())
    }

    fn spawn(
        concurrency: usize,
        handler: TaskHandler<T>,
        on_error: Option<ErrorHandler<T>>,
    ) -> Self {
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            ended: AtomicBool::new(false),
        });

        let workers = (0..concurrency.max(1))
            .map(|index| {
                tokio::spawn(Self::worker_loop(
                    index,
                    Arc::clone(&shared),
                    Arc::clone(&handler),
                    on_error.clone(),
                ))
            })
            .collect();

        Self { shared, workers }
    }

    async fn worker_loop(
        index: usize,
        shared: Arc<PoolShared<T>>,
        handler: TaskHandler<T>,
        on_error: Option<ErrorHandler<T>>,
    ) {
        loop {
            // Register interest before looking at the queue so a wake-up sent
            // between the check and the await is not lost.
            let notified = shared.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(task) = shared.pop() {
                let retained = task.clone();
                let outcome = AssertUnwindSafe(handler(task, index))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(ExportError::TaskJoin(format!(
                            "pool handler panicked on worker {}",
                            index
                        )))
                    });

                if let Err(err) = outcome {
                    match &on_error {
                        Some(on_error) => on_error(err, retained, index),
                        None => warn!("pool worker {} task failed: {}", index, err),
                    }
                }
                continue;
            }

            if shared.ended.load(Ordering::Acquire) {
                break;
            }
            notified.await;
        }
        debug!("pool worker {} finished", index);
    }

    /// Enqueue tasks. Never blocks.
    pub fn add_tasks<I>(&self, tasks: I)
    where
        I: IntoIterator<Item = T>,
    {
        if let Ok(mut queue) = self.shared.queue.lock() {
            queue.extend(tasks);
        }
        self.shared.wake.notify_waiters();
    }

    /// Tasks waiting for a worker
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn concurrency(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting work once the queue drains and wait for every worker
    pub async fn end(self) -> Result<()> {
        self.shared.ended.store(true, Ordering::Release);
        self.shared.wake.notify_waiters();

        for worker in self.workers {
            worker.await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_every_task_runs_exactly_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let pool = BoundedTaskPool::new(4, move |task: u32, _| {
            let sink = Arc::clone(&sink);
            async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                sink.lock().unwrap().push(task);
                Ok(())
            }
        });

        pool.add_tasks(0..50);
        pool.end().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 50);
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len(), 50);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let pool = BoundedTaskPool::new(3, move |_task: u32, _| {
            let (running, peak) = (Arc::clone(&r), Arc::clone(&p));
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        });

        pool.add_tasks(0..20);
        pool.end().await.unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_single_worker_runs_in_fifo_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let pool = BoundedTaskPool::new(1, move |task: u32, _| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(task);
                Ok(())
            }
        });

        pool.add_tasks([1, 2, 3]);
        pool.add_tasks([4, 5]);
        pool.end().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_failures_reach_error_handler() {
        let failed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&failed);
        let pool = BoundedTaskPool::with_error_handler(
            2,
            |task: u32, _| async move {
                if task % 2 == 0 {
                    Err(ExportError::Custom(format!("task {}", task)))
                } else {
                    Ok(())
                }
            },
            move |err, task, _| {
                assert!(matches!(err, ExportError::Custom(_)));
                sink.lock().unwrap().push(task);
            },
        );

        pool.add_tasks(0..6);
        pool.end().await.unwrap();

        let mut failed = failed.lock().unwrap().clone();
        failed.sort();
        assert_eq!(failed, vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stop_pool() {
        let done = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let (d, e) = (Arc::clone(&done), Arc::clone(&errors));
        let pool = BoundedTaskPool::with_error_handler(
            1,
            move |task: u32, _| {
                let done = Arc::clone(&d);
                async move {
                    if task == 0 {
                        panic!("bad task");
                    }
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            move |_, _, _| {
                e.fetch_add(1, Ordering::SeqCst);
            },
        );

        pool.add_tasks(0..4);
        pool.end().await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tasks_added_after_idle_are_picked_up() {
        let done = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&done);
        let pool = BoundedTaskPool::new(2, move |_task: u32, _| {
            let done = Arc::clone(&d);
            async move {
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        pool.add_tasks([1]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.add_tasks([2, 3]);
        pool.end().await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_end_without_tasks() {
        let pool = BoundedTaskPool::new(0, |_task: u32, _| async { Ok(()) });
        assert_eq!(pool.concurrency(), 1);
        assert_eq!(pool.pending(), 0);
        pool.end().await.unwrap();
    }
}
