//! Stress scenarios for the synchronization primitives
//!
//! Each scenario spreads its tasks over a pool of OS threads, every thread
//! running its own compio runtime, so the primitives see real parallelism as
//! well as task interleaving on one thread. A scenario fails with
//! [`HarnessError::InvariantViolated`] when a primitive breaks its contract.

mod counter;
mod numlock;
mod semaphore;
mod until;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::cli::{Args, Command};
use crate::error::{HarnessError, Result};
use crate::progress::ProgressTracker;

pub use counter::run_counter;
pub use numlock::run_numlock;
pub use semaphore::run_semaphore;
pub use until::run_until;

/// Outcome of one scenario
#[derive(Debug, Clone)]
pub struct StressReport {
    /// Scenario name as given on the command line
    pub scenario: &'static str,
    /// Tasks, rounds or increments that completed
    pub operations: usize,
    /// Wall-clock time of the concurrent part of the run
    pub elapsed: Duration,
    /// Highest number of tasks observed inside a guarded section at once
    pub peak_concurrency: Option<usize>,
    /// `until` reservations that expired before they were observed
    pub expired: usize,
}

impl fmt::Display for StressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} operations in {:?}",
            self.scenario, self.operations, self.elapsed
        )?;
        if let Some(peak) = self.peak_concurrency {
            write!(f, ", peak concurrency {peak}")?;
        }
        if self.expired > 0 {
            write!(f, ", {} expired reservations", self.expired)?;
        }
        Ok(())
    }
}

/// Run the scenario selected on the command line
///
/// # Errors
///
/// Returns an error if a worker could not be started, a primitive reported
/// misuse, or an invariant was violated.
pub fn run(args: &Args) -> Result<StressReport> {
    let threads = args.effective_threads();
    let config = args.semaphore_config();

    let report = match args.command {
        Command::Semaphore {
            capacity,
            tasks,
            hold_us,
        } => {
            let workers = Workers::new(threads, tasks, args.progress);
            run_semaphore(&workers, capacity, config, Duration::from_micros(hold_us))?
        }
        Command::Counter { increments } => {
            let workers = Workers::new(threads, increments, args.progress);
            run_counter(&workers)?
        }
        Command::Numlock {
            keys,
            tasks,
            hold_us,
        } => {
            let workers = Workers::new(threads, tasks, args.progress);
            run_numlock(&workers, keys, Duration::from_micros(hold_us))?
        }
        Command::Until { capacity, rounds } => {
            let workers = Workers::new(threads, rounds, args.progress);
            run_until(&workers, capacity, config)?
        }
    };

    info!(%report, "scenario finished");
    Ok(report)
}

/// Thread-per-runtime task pool
pub struct Workers {
    threads: usize,
    tasks: usize,
    progress: ProgressTracker,
}

impl Workers {
    /// Pool of `threads` workers (at least one) sharing `tasks` tasks
    #[must_use]
    pub fn new(threads: usize, tasks: usize, show_progress: bool) -> Self {
        Self {
            threads: threads.max(1),
            tasks,
            progress: ProgressTracker::new(tasks, show_progress),
        }
    }

    /// Total number of tasks a run performs
    #[must_use]
    pub fn tasks(&self) -> usize {
        self.tasks
    }

    /// Run `task(id)` for every id in `0..tasks`, spread round-robin over the threads
    ///
    /// Returns the wall-clock time taken by the whole run.
    ///
    /// # Errors
    ///
    /// Returns the first error any task produced, or [`HarnessError::Runtime`]
    /// if a task or thread panicked.
    pub fn run<F, Fut>(&self, scenario: &str, task: F) -> Result<Duration>
    where
        F: Fn(usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let task = Arc::new(task);
        let started = Instant::now();

        let handles = (0..self.threads)
            .map(|worker| {
                let task = task.clone();
                let progress = self.progress.clone();
                let (threads, tasks) = (self.threads, self.tasks);
                thread::Builder::new()
                    .name(format!("semgate-worker-{worker}"))
                    .spawn(move || run_worker(worker, threads, tasks, &task, &progress))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        let mut first_error = None;
        for handle in handles {
            let outcome = handle
                .join()
                .map_err(|_| HarnessError::Runtime("worker thread panicked".to_string()))
                .and_then(|result| result);
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }

        self.progress.finish(scenario);
        match first_error {
            Some(err) => Err(err),
            None => Ok(started.elapsed()),
        }
    }
}

fn run_worker<F, Fut>(
    worker: usize,
    threads: usize,
    tasks: usize,
    task: &Arc<F>,
    progress: &ProgressTracker,
) -> Result<()>
where
    F: Fn(usize) -> Fut + 'static,
    Fut: Future<Output = Result<()>> + 'static,
{
    let runtime = compio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut handles = Vec::new();
        for id in (worker..tasks).step_by(threads) {
            let task = task.clone();
            let progress = progress.clone();
            handles.push(compio::runtime::spawn(async move {
                let result = task(id).await;
                progress.tick();
                result
            }));
        }
        debug!(worker, spawned = handles.len(), "worker tasks spawned");

        for handle in handles {
            handle
                .await
                .map_err(|_| HarnessError::Runtime("task panicked".to_string()))??;
        }
        Ok::<(), HarnessError>(())
    })
}

fn check(condition: bool, describe: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(HarnessError::InvariantViolated(describe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_workers_run_every_task_once() {
        let workers = Workers::new(3, 50, false);
        let seen = Arc::new((0..50).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());

        let counts = seen.clone();
        workers
            .run("ids", move |id| {
                let counts = counts.clone();
                async move {
                    counts[id].fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .unwrap();

        assert!(seen.iter().all(|c| c.load(Ordering::SeqCst) == 1));
        assert_eq!(workers.progress.completed(), 50);
    }

    #[test]
    fn test_workers_report_task_errors() {
        let workers = Workers::new(2, 4, false);
        let result = workers.run("failing", |id| async move {
            check(id != 2, || format!("task {id} failed"))
        });

        assert!(matches!(
            result,
            Err(HarnessError::InvariantViolated(message)) if message == "task 2 failed"
        ));
    }

    #[test]
    fn test_report_display() {
        let report = StressReport {
            scenario: "semaphore",
            operations: 10,
            elapsed: Duration::from_millis(3),
            peak_concurrency: Some(4),
            expired: 0,
        };
        assert_eq!(
            report.to_string(),
            "semaphore: 10 operations in 3ms, peak concurrency 4"
        );
    }
}
