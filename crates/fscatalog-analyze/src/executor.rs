//! Fixed-size worker pool with a single result consumer.
//!
//! Workers run the task and send plain values back over a channel. The
//! calling thread drains the channel, so whatever state it folds results
//! into never needs a lock. Result order is unspecified.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use fscatalog_core::CatalogError;

/// Counters from one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Items handed to the pool.
    pub submitted: usize,
    /// Items whose task returned a value.
    pub succeeded: usize,
    /// Items whose task returned an error or panicked.
    pub failed: usize,
}

/// Runs a function over a batch of items on a dedicated rayon pool.
pub struct ParallelExecutor {
    pool: ThreadPool,
}

impl ParallelExecutor {
    /// Build a pool with `workers` threads (0 = available CPUs).
    pub fn new(workers: usize) -> Result<Self, CatalogError> {
        let workers = match workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fscatalog-worker-{i}"))
            .build()
            .map_err(|e| CatalogError::ThreadPool {
                message: e.to_string(),
            })?;
        debug!(workers, "worker pool ready");
        Ok(Self { pool })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `task` on every item and hand each success to `consume`.
    ///
    /// `consume` runs on the calling thread while workers are still busy.
    /// Errors and panics are logged and counted; they never stop the batch.
    pub fn for_each<T, R, E, F, C>(
        &self,
        items: impl IntoIterator<Item = T>,
        task: F,
        mut consume: C,
    ) -> ExecutionStats
    where
        T: Send,
        R: Send,
        E: fmt::Display,
        F: Fn(T) -> Result<R, E> + Sync,
        C: FnMut(R),
    {
        let (tx, rx) = mpsc::channel::<Option<R>>();
        let task = &task;
        let mut stats = ExecutionStats::default();

        self.pool.in_place_scope(|scope| {
            for item in items {
                stats.submitted += 1;
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| task(item))) {
                        Ok(Ok(value)) => Some(value),
                        Ok(Err(e)) => {
                            warn!(error = %e, "task failed, result omitted");
                            None
                        }
                        Err(_) => {
                            warn!("task panicked, result omitted");
                            None
                        }
                    };
                    let _ = tx.send(outcome);
                });
            }
            drop(tx);

            for outcome in rx {
                match outcome {
                    Some(value) => {
                        stats.succeeded += 1;
                        consume(value);
                    }
                    None => stats.failed += 1,
                }
            }
        });

        stats
    }

    /// Run `task` on every item and collect the successes in arbitrary order.
    pub fn execute<T, R, E, F>(&self, items: impl IntoIterator<Item = T>, task: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        E: fmt::Display,
        F: Fn(T) -> Result<R, E> + Sync,
    {
        let mut results = Vec::new();
        self.for_each(items, task, |value| results.push(value));
        results
    }
}

impl fmt::Debug for ParallelExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelExecutor")
            .field("workers", &self.workers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_collects_all_results() {
        let executor = ParallelExecutor::new(4).unwrap();
        let mut results: Vec<u64> = executor.execute(1..=100u64, |n| Ok::<_, String>(n * 2));
        results.sort_unstable();
        assert_eq!(results, (1..=100u64).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_failures_are_omitted() {
        let executor = ParallelExecutor::new(2).unwrap();
        let mut evens = Vec::new();
        let stats = executor.for_each(
            0..10u32,
            |n| if n % 2 == 0 { Ok(n) } else { Err(format!("{n} is odd")) },
            |n| evens.push(n),
        );
        evens.sort_unstable();

        assert_eq!(evens, vec![0, 2, 4, 6, 8]);
        assert_eq!(stats.submitted, 10);
        assert_eq!(stats.succeeded, 5);
        assert_eq!(stats.failed, 5);
    }

    #[test]
    fn test_panic_does_not_abort_batch() {
        let executor = ParallelExecutor::new(2).unwrap();
        let stats = executor.for_each(
            0..5u32,
            |n| {
                if n == 3 {
                    panic!("boom");
                }
                Ok::<_, String>(n)
            },
            |_| {},
        );
        assert_eq!(stats.succeeded, 4);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_auto_sizing() {
        let executor = ParallelExecutor::new(0).unwrap();
        assert!(executor.workers() >= 1);
    }

    #[test]
    fn test_empty_batch() {
        let executor = ParallelExecutor::new(1).unwrap();
        let results: Vec<u8> = executor.execute(Vec::<u8>::new(), |n| Ok::<_, String>(n));
        assert!(results.is_empty());
    }
}
