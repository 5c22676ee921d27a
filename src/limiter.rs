//! Bounded-admission scheduler for render operations.
//!
//! Built on a fair [`tokio::sync::Semaphore`]: waiters are granted permits in the
//! order they asked for them, so tasks queued beyond capacity start in submission
//! order. The permit is released when the task's future finishes, whichever way.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Caps the number of tasks running at once; excess submissions wait FIFO.
#[derive(Debug, Clone)]
pub struct RenderLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    waiting: Arc<AtomicUsize>,
}

/// Semaphore closed underneath a waiting task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("render limiter is closed")]
pub struct LimiterClosed;

impl RenderLimiter {
    pub fn new(max_concurrency: usize) -> Self {
        let permits = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            max_concurrency: permits,
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Tasks currently holding a slot.
    pub fn active(&self) -> usize {
        self.max_concurrency - self.semaphore.available_permits()
    }

    /// Tasks submitted but not yet admitted.
    pub fn queued(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Runs `task` once a slot is free and resolves to exactly its output.
    pub async fn submit<F, T>(&self, task: F) -> Result<T, LimiterClosed>
    where
        F: Future<Output = T>,
    {
        let permit = {
            let _waiting = WaitingGuard::enter(&self.waiting);
            self.semaphore
                .acquire()
                .await
                .map_err(|_| LimiterClosed)?
        };
        let output = task.await;
        drop(permit);
        Ok(output)
    }

    /// Stops admitting work; queued and future submissions fail with [`LimiterClosed`].
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// Keeps the queue counter honest when a waiting submission is dropped.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn concurrency_never_zero() {
        let limiter = RenderLimiter::new(0);
        assert_eq!(limiter.max_concurrency(), 1);
        assert_eq!(limiter.active(), 0);
    }

    #[tokio::test]
    async fn submit_returns_task_output() {
        let limiter = RenderLimiter::new(2);
        let out = limiter.submit(async { 41 + 1 }).await;
        assert_eq!(out, Ok(42));
        assert_eq!(limiter.active(), 0);
    }

    #[tokio::test]
    async fn failing_task_releases_its_slot() {
        let limiter = RenderLimiter::new(1);
        let first: Result<Result<(), &str>, _> = limiter.submit(async { Err("boom") }).await;
        assert_eq!(first, Ok(Err("boom")));

        let second = tokio::time::timeout(Duration::from_secs(1), limiter.submit(async { 7 }))
            .await
            .expect("slot released after failure");
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn closed_limiter_rejects_submissions() {
        let limiter = RenderLimiter::new(1);
        limiter.close();
        assert_eq!(limiter.submit(async {}).await, Err(LimiterClosed));
        assert_eq!(limiter.queued(), 0);
    }

    #[tokio::test]
    async fn dropped_waiter_leaves_queue() {
        let limiter = RenderLimiter::new(1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let holder = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .submit(async {
                        let _ = release_rx.await;
                    })
                    .await
            })
        };
        while limiter.active() == 0 {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.submit(async {}).await })
        };
        while limiter.queued() == 0 {
            tokio::task::yield_now().await;
        }
        waiter.abort();
        let _ = waiter.await;
        assert_eq!(limiter.queued(), 0);

        let _ = release_tx.send(());
        holder.await.expect("holder task").expect("admitted");
        assert_eq!(limiter.active(), 0);
    }
}
