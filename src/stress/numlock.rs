//! Per-key exclusion scenario

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use semgate_sync::NumLock;

use super::{check, StressReport, Workers};
use crate::cli::require_positive;
use crate::error::{HarnessError, Result};

/// Task `id` locks key `id % keys` and holds it for `hold`. Two tasks inside
/// the same key at once is a violation; different keys may overlap freely.
///
/// # Errors
///
/// Returns an invariant violation on any same-key overlap or if the registry
/// ends up with an unexpected number of keys.
pub fn run_numlock(workers: &Workers, keys: usize, hold: Duration) -> Result<StressReport> {
    require_positive("keys", keys)?;
    let locks = Arc::new(NumLock::new());
    let inside: Arc<Vec<AtomicUsize>> =
        Arc::new((0..keys).map(|_| AtomicUsize::new(0)).collect());
    let overlaps = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let in_flight = Arc::new(AtomicUsize::new(0));

    let elapsed = {
        let (locks, inside, overlaps) = (locks.clone(), inside.clone(), overlaps.clone());
        let (peak, in_flight) = (peak.clone(), in_flight.clone());
        workers.run("numlock", move |id| {
            let (locks, inside, overlaps) = (locks.clone(), inside.clone(), overlaps.clone());
            let (peak, in_flight) = (peak.clone(), in_flight.clone());
            async move {
                let slot = id % inside.len();
                let key = i64::try_from(slot)
                    .map_err(|_| HarnessError::InvalidConfig(format!("key {slot} out of range")))?;

                locks.lock(key).await;
                if inside[slot].fetch_add(1, Ordering::SeqCst) != 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);

                compio::time::sleep(hold).await;

                in_flight.fetch_sub(1, Ordering::SeqCst);
                inside[slot].fetch_sub(1, Ordering::SeqCst);
                locks.unlock(key).await?;
                Ok::<(), HarnessError>(())
            }
        })?
    };

    let overlaps = overlaps.load(Ordering::SeqCst);
    check(overlaps == 0, || {
        format!("{overlaps} times two tasks held the same key")
    })?;

    let registered = futures::executor::block_on(locks.len());
    let expected = keys.min(workers.tasks());
    check(registered == expected, || {
        format!("{registered} keys registered, expected {expected}")
    })?;

    Ok(StressReport {
        scenario: "numlock",
        operations: workers.tasks(),
        elapsed,
        peak_concurrency: Some(peak.load(Ordering::SeqCst)),
        expired: 0,
    })
}
