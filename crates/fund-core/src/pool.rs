//! Bounded worker pool shared by the coverage controller and the backtest engine.
//!
//! Every item gets exactly one [`TaskOutcome`]. A panic inside one task is
//! caught and reported for that item only; when the batch deadline passes,
//! unfinished tasks are aborted and reported as timed out.

use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Result of running one item through the pool.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Completed(T),
    TimedOut,
    Panicked(String),
}

impl<T> TaskOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Fixed-size pool running at most `workers` computations at once.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    batch_timeout: Option<Duration>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            batch_timeout: None,
        }
    }

    /// Bound the wall-clock time of each `run` call.
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `task` over every item and return outcomes in item order.
    pub async fn run<I, F, Fut, T>(&self, items: Vec<I>, task: F) -> Vec<TaskOutcome<T>>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let deadline = self.batch_timeout.map(|t| Instant::now() + t);
        let mut set = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let fut = task(item);
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = AssertUnwindSafe(fut).catch_unwind().await;
                (index, result.map_err(panic_message))
            });
        }

        let mut outcomes: Vec<Option<TaskOutcome<T>>> = (0..total).map(|_| None).collect();

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, set.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        let pending = set.len();
                        warn!(pending, total, "Batch deadline reached, aborting pending tasks");
                        set.abort_all();
                        break;
                    }
                },
                None => set.join_next().await,
            };

            match next {
                None => break,
                Some(Ok((index, Ok(value)))) => outcomes[index] = Some(TaskOutcome::Completed(value)),
                Some(Ok((index, Err(message)))) => {
                    warn!(index, panic = %message, "Task panicked");
                    outcomes[index] = Some(TaskOutcome::Panicked(message));
                }
                Some(Err(e)) => debug!(error = %e, "Task join failed"),
            }
        }

        outcomes
            .into_iter()
            .map(|o| o.unwrap_or(TaskOutcome::TimedOut))
            .collect()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Cooperative cancellation checked between batches and periods.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_outcomes_preserve_item_order() {
        let pool = WorkerPool::new(3);
        let outcomes = pool
            .run((0..10).collect(), |i: u64| async move {
                tokio::time::sleep(Duration::from_millis(10 - i)).await;
                i * 2
            })
            .await;

        let values: Vec<u64> = outcomes.into_iter().filter_map(|o| o.completed()).collect();
        assert_eq!(values, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcomes = pool
            .run((0..8).collect(), |_: usize| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(outcomes.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2, "at most two tasks should run at once");
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let pool = WorkerPool::new(4);
        let outcomes = pool
            .run(vec![1, 2, 3], |i: i32| async move {
                if i == 2 {
                    panic!("bad entity");
                }
                i
            })
            .await;

        assert_eq!(outcomes[0], TaskOutcome::Completed(1));
        assert_eq!(outcomes[1], TaskOutcome::Panicked("bad entity".to_string()));
        assert_eq!(outcomes[2], TaskOutcome::Completed(3));
    }

    #[tokio::test]
    async fn test_batch_timeout_marks_stalled_tasks() {
        let pool = WorkerPool::new(4).with_batch_timeout(Duration::from_millis(50));
        let outcomes = pool
            .run(vec![1u64, 5_000], |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                ms
            })
            .await;

        assert_eq!(outcomes[0], TaskOutcome::Completed(1));
        assert_eq!(outcomes[1], TaskOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pool = WorkerPool::new(2);
        let outcomes: Vec<TaskOutcome<()>> = pool.run(Vec::<u8>::new(), |_| async {}).await;
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
