//! Lost-update scenario for the guarded counter

use std::sync::Arc;

use semgate_sync::Counter;

use super::{check, StressReport, Workers};
use crate::error::Result;

/// One increment per task; the final value must equal the task count.
///
/// # Errors
///
/// Returns an invariant violation if any increment was lost.
pub fn run_counter(workers: &Workers) -> Result<StressReport> {
    let counter = Arc::new(Counter::default());

    let elapsed = {
        let counter = counter.clone();
        workers.run("counter", move |_| {
            let counter = counter.clone();
            async move {
                counter.inc().await;
                Ok(())
            }
        })?
    };

    let expected = i64::try_from(workers.tasks()).unwrap_or(i64::MAX);
    let value = counter.value();
    check(value == expected, || {
        format!("counter reads {value} after {expected} increments")
    })?;

    Ok(StressReport {
        scenario: "counter",
        operations: workers.tasks(),
        elapsed,
        peak_concurrency: None,
        expired: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_scenario_counts_every_increment() {
        let workers = Workers::new(4, 1000, false);
        let report = run_counter(&workers).unwrap();
        assert_eq!(report.operations, 1000);
    }
}
