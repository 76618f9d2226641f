//! Tunables shared by every clone of a semaphore

use std::time::Duration;

/// Default grace window before an unobserved [`Until`](crate::Until)
/// reservation is handed back to the pool.
pub const DEFAULT_UNTIL_FREE_TIMEOUT: Duration = Duration::from_millis(50);

/// Per-semaphore configuration
///
/// # Example
///
/// ```rust
/// use semgate_sync::{Semaphore, SemaphoreConfig};
/// use std::time::Duration;
///
/// let config = SemaphoreConfig::default().with_until_free_timeout(Duration::from_millis(5));
/// let sem = Semaphore::with_config(4, config);
/// assert_eq!(sem.config().until_free_timeout, Duration::from_millis(5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreConfig {
    /// How long a slot reserved by `until()` stays reserved without an observer
    pub until_free_timeout: Duration,
}

impl SemaphoreConfig {
    /// Replace the abandonment timeout used by `until()`
    #[must_use]
    pub fn with_until_free_timeout(mut self, timeout: Duration) -> Self {
        self.until_free_timeout = timeout;
        self
    }
}

impl Default for SemaphoreConfig {
    fn default() -> Self {
        Self {
            until_free_timeout: DEFAULT_UNTIL_FREE_TIMEOUT,
        }
    }
}
