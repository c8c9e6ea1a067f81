//! Bounded concurrency scheduling.
//!
//! Two independent pools share the tokio runtime:
//! - primary: about half the host's parallelism, for latency-sensitive work
//!   such as expanding the folder the user just opened
//! - secondary: about a quarter, for prefetching and counting
//!
//! A pool is a permit budget, not a queue. Submissions wait for a permit in
//! no particular order. Work that must be ordered has to serialize itself.

use std::future::Future;
use std::sync::Arc;

use log::trace;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A capacity-bounded execution pool.
#[derive(Debug, Clone)]
pub struct Pool {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Pool {
    /// Create a pool allowing `capacity` concurrently running tasks (minimum 1).
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of idle slots.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run `work` once a slot frees up.
    ///
    /// If `cancel` fires before a slot is granted the work never starts and
    /// the handle resolves to [`Error::Cancelled`]. Once started, the work is
    /// handed the token and is expected to observe it itself.
    pub fn submit<F, Fut, T>(&self, cancel: CancellationToken, work: F) -> TaskHandle<T>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let name = self.name;
        let handle = tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                permit = semaphore.acquire_owned() => permit,
            };
            let Ok(_permit) = permit else {
                return Err(Error::Cancelled);
            };
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            trace!("[{name}] task started");
            let result = work(cancel).await;
            trace!("[{name}] task finished");
            result
        });
        TaskHandle { inner: handle }
    }
}

/// Handle to submitted work.
#[derive(Debug)]
pub struct TaskHandle<T> {
    inner: JoinHandle<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Wait for the work to finish.
    ///
    /// A panic inside the work is resumed on the joining task.
    pub async fn join(self) -> Result<T> {
        match self.inner.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(Error::Cancelled),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

/// Primary and secondary pools plus an unbounded lane.
#[derive(Debug, Clone)]
pub struct Scheduler {
    primary: Pool,
    secondary: Pool,
}

impl Default for Scheduler {
    fn default() -> Self {
        let (primary, secondary) = default_capacities();
        Self::new(primary, secondary)
    }
}

impl Scheduler {
    pub fn new(primary_capacity: usize, secondary_capacity: usize) -> Self {
        Self {
            primary: Pool::new("primary", primary_capacity),
            secondary: Pool::new("secondary", secondary_capacity),
        }
    }

    pub fn primary(&self) -> &Pool {
        &self.primary
    }

    pub fn secondary(&self) -> &Pool {
        &self.secondary
    }

    /// Submit interactive, latency-sensitive work.
    pub fn submit_primary<F, Fut, T>(&self, cancel: CancellationToken, work: F) -> TaskHandle<T>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.primary.submit(cancel, work)
    }

    /// Submit lower-priority background work.
    pub fn submit_secondary<F, Fut, T>(&self, cancel: CancellationToken, work: F) -> TaskHandle<T>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.secondary.submit(cancel, work)
    }

    /// Submit short opportunistic work that must not wait behind either pool.
    pub fn submit_unbounded<F, Fut, T>(&self, cancel: CancellationToken, work: F) -> TaskHandle<T>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(async move {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            work(cancel).await
        });
        TaskHandle { inner: handle }
    }
}

/// Pool sizes derived from the host's parallelism: about 1/2 and 1/4, minimum 1.
pub fn default_capacities() -> (usize, usize) {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    ((parallelism / 2).max(1), (parallelism / 4).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn default_capacities_are_bounded() {
        let (primary, secondary) = default_capacities();
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert!(primary >= 1 && secondary >= 1);
        assert!(secondary <= primary);
        assert!(primary <= parallelism.max(1));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let pool = Pool::new("test", 0);
        assert_eq!(pool.capacity(), 1);
    }

    #[tokio::test]
    async fn submit_returns_work_result() {
        let scheduler = Scheduler::new(2, 1);
        let handle = scheduler.submit_primary(CancellationToken::new(), |_| async { Ok(42) });
        assert_eq!(handle.join().await.unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pool_never_exceeds_capacity() {
        let pool = Pool::new("bounded", 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                pool.submit(CancellationToken::new(), move |_| async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle.join().await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_runs() {
        let pool = Pool::new("single", 1);
        let gate = CancellationToken::new();
        let started = Arc::new(tokio::sync::Notify::new());

        // Occupy the only slot until the gate opens.
        let blocker = {
            let gate = gate.clone();
            let started = started.clone();
            pool.submit(CancellationToken::new(), move |_| async move {
                started.notify_one();
                gate.cancelled().await;
                Ok(())
            })
        };
        started.notified().await;
        assert_eq!(pool.available(), 0);

        let ran = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let queued = {
            let ran = ran.clone();
            pool.submit(cancel.clone(), move |_| async move {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
        };

        cancel.cancel();
        assert!(matches!(queued.join().await, Err(Error::Cancelled)));
        gate.cancel();
        blocker.join().await.unwrap();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn running_work_observes_cancellation_cooperatively() {
        let scheduler = Scheduler::new(1, 1);
        let cancel = CancellationToken::new();
        let started = Arc::new(tokio::sync::Notify::new());

        let handle = {
            let started = started.clone();
            scheduler.submit_secondary(cancel.clone(), move |token| async move {
                started.notify_one();
                token.cancelled().await;
                Ok("observed")
            })
        };

        started.notified().await;
        cancel.cancel();
        assert_eq!(handle.join().await.unwrap(), "observed");
    }

    #[tokio::test]
    async fn unbounded_skips_pool_limits() {
        let scheduler = Scheduler::new(1, 1);
        let gate = CancellationToken::new();
        let blocker = {
            let gate = gate.clone();
            scheduler.submit_primary(CancellationToken::new(), move |_| async move {
                gate.cancelled().await;
                Ok(())
            })
        };

        let quick = scheduler.submit_unbounded(CancellationToken::new(), |_| async { Ok(7) });
        assert_eq!(quick.join().await.unwrap(), 7);

        gate.cancel();
        blocker.join().await.unwrap();
    }

    #[tokio::test]
    #[should_panic(expected = "boom")]
    async fn panics_resume_on_join() {
        let scheduler = Scheduler::new(1, 1);
        let handle = scheduler.submit_primary(CancellationToken::new(), |_| async {
            if true {
                panic!("boom");
            }
            Ok(())
        });
        let _ = handle.join().await;
    }
}
