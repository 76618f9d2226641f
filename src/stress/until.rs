//! Soft-wait scenario: `until` rounds followed by an idle check

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use semgate_sync::{Semaphore, SemaphoreConfig, SyncError};
use tracing::debug;

use super::{check, StressReport, Workers};
use crate::cli::require_positive;
use crate::error::{HarnessError, Result};

const IDLE_DEADLINE: Duration = Duration::from_secs(5);

/// Each round waits for a slot through `until`, holds it briefly and gives
/// it back. Expired reservations are counted, not treated as failures. After
/// the rounds, `is_free` must report the semaphore idle and every slot must
/// be back.
///
/// # Errors
///
/// Returns an invariant violation if slots are still held after the idle
/// check, or a runtime error if the check never completes.
pub fn run_until(
    workers: &Workers,
    capacity: usize,
    config: SemaphoreConfig,
) -> Result<StressReport> {
    require_positive("capacity", capacity)?;
    let sem = Semaphore::with_config(capacity, config);
    let expired = Arc::new(AtomicUsize::new(0));

    let elapsed = {
        let (sem, expired) = (sem.clone(), expired.clone());
        workers.run("until", move |_| {
            let (sem, expired) = (sem.clone(), expired.clone());
            async move {
                match sem.until().await {
                    Ok(()) => {
                        compio::time::sleep(Duration::from_micros(50)).await;
                        sem.unlock()?;
                    }
                    Err(SyncError::UntilExpired(after)) => {
                        debug!(?after, "reservation expired before it was observed");
                        expired.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(err) => return Err(err.into()),
                }
                Ok::<(), HarnessError>(())
            }
        })?
    };

    let window = config.until_free_timeout;
    let runtime = compio::runtime::Runtime::new()?;
    runtime
        .block_on(compio::time::timeout(IDLE_DEADLINE, sem.is_free(window)))
        .map_err(|_| {
            HarnessError::Runtime(format!("semaphore not idle after {IDLE_DEADLINE:?}: {sem}"))
        })?;
    check(sem.free() == capacity, || format!("slots leaked: {sem}"))?;

    Ok(StressReport {
        scenario: "until",
        operations: workers.tasks(),
        elapsed,
        peak_concurrency: None,
        expired: expired.load(Ordering::SeqCst),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_until_scenario_returns_every_slot() {
        let workers = Workers::new(2, 40, false);
        let config =
            SemaphoreConfig::default().with_until_free_timeout(Duration::from_millis(20));
        let report = run_until(&workers, 2, config).unwrap();
        assert_eq!(report.operations, 40);
    }
}
