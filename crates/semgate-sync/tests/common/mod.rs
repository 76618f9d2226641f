//! Shared helpers for the integration tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Aborts the test process if dropped later than its deadline
///
/// A deadlocked primitive would otherwise hang the whole test binary.
pub struct TestTimeoutGuard {
    finished: Arc<AtomicBool>,
}

impl Drop for TestTimeoutGuard {
    fn drop(&mut self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

/// Start a watchdog for the current test; keep the guard alive until the end
pub fn test_timeout_guard(deadline: Duration) -> TestTimeoutGuard {
    let finished = Arc::new(AtomicBool::new(false));
    let watched = Arc::clone(&finished);
    thread::spawn(move || {
        thread::sleep(deadline);
        if !watched.load(Ordering::SeqCst) {
            eprintln!("Test still running after {deadline:?}. Aborting.");
            std::process::abort();
        }
    });
    TestTimeoutGuard { finished }
}
