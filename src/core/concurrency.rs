//! Async concurrency limiting for the checker/transferer worker pools: a
//! `ConcurrencyLimiter` built on `tokio::sync::Semaphore`, since the
//! scheduler already runs inside the Tokio runtime the async backend trait
//! requires.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A named pool of permits bounding how many checker or transferer tasks
/// may run concurrently (`--checkers` default 8, `--transfers` default 4).
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        let max = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Acquire a permit, waiting if the pool is fully occupied.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed")
    }

    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn acquire_and_release_tracks_available_permits() {
        let limiter = ConcurrencyLimiter::new(2);
        assert_eq!(limiter.available(), 2);

        let permit1 = limiter.acquire().await;
        assert_eq!(limiter.available(), 1);

        let permit2 = limiter.acquire().await;
        assert_eq!(limiter.available(), 0);

        drop(permit1);
        assert_eq!(limiter.available(), 1);
        drop(permit2);
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test]
    async fn try_acquire_fails_when_exhausted() {
        let limiter = ConcurrencyLimiter::new(1);
        let _permit = limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_none());
    }

    #[tokio::test]
    async fn zero_is_clamped_to_one_permit() {
        let limiter = ConcurrencyLimiter::new(0);
        assert_eq!(limiter.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn limits_concurrent_tasks_under_load() {
        let limiter = ConcurrencyLimiter::new(3);
        let counter = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            let counter = counter.clone();
            let max_observed = max_observed.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                let current = counter.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(max_observed.load(Ordering::SeqCst) <= 3);
    }
}
