//! Bounded-concurrency scenario

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use semgate_sync::{Semaphore, SemaphoreConfig};
use tracing::info;

use super::{check, StressReport, Workers};
use crate::cli::require_positive;
use crate::error::Result;

/// Every task holds one slot for `hold`; at no point may more than
/// `capacity` tasks be inside.
///
/// # Errors
///
/// Returns an invariant violation if the peak exceeds the capacity or slots
/// are still held after the run.
pub fn run_semaphore(
    workers: &Workers,
    capacity: usize,
    config: SemaphoreConfig,
    hold: Duration,
) -> Result<StressReport> {
    require_positive("capacity", capacity)?;
    let sem = Semaphore::with_config(capacity, config);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    info!(%sem, tasks = workers.tasks(), "starting semaphore scenario");

    let elapsed = {
        let (sem, in_flight, peak) = (sem.clone(), in_flight.clone(), peak.clone());
        workers.run("semaphore", move |_| {
            let (sem, in_flight, peak) = (sem.clone(), in_flight.clone(), peak.clone());
            async move {
                let _permit = sem.acquire().await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                compio::time::sleep(hold).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })?
    };

    let peak = peak.load(Ordering::SeqCst);
    check(peak <= capacity, || {
        format!("{peak} tasks held slots of a capacity-{capacity} semaphore")
    })?;
    check(sem.free() == capacity, || format!("slots leaked: {sem}"))?;

    Ok(StressReport {
        scenario: "semaphore",
        operations: workers.tasks(),
        elapsed,
        peak_concurrency: Some(peak),
        expired: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semaphore_scenario_respects_capacity() {
        let workers = Workers::new(4, 200, false);
        let report = run_semaphore(
            &workers,
            3,
            SemaphoreConfig::default(),
            Duration::from_micros(100),
        )
        .unwrap();

        assert_eq!(report.operations, 200);
        assert!(report.peak_concurrency.unwrap() <= 3);
    }
}
