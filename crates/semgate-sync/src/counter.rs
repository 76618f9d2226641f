//! Integer whose updates are serialized by a one-slot semaphore

use std::sync::atomic::{AtomicI64, Ordering};

use crate::semaphore::Semaphore;

/// A semaphore-guarded integer
///
/// Every `inc`/`dec` holds the guard for its whole read-modify-write, so
/// concurrent updates never interleave. [`value`](Self::value) is a relaxed
/// read that does not wait for the guard; use
/// [`guarded_value`](Self::guarded_value) to read in order with updates.
///
/// # Example
///
/// ```rust,no_run
/// use semgate_sync::Counter;
///
/// # async fn example() {
/// let counter = Counter::new(10);
/// counter.inc().await;
/// counter.dec().await;
/// counter.dec().await;
/// assert_eq!(counter.value(), 9);
/// # }
/// ```
#[derive(Debug)]
pub struct Counter {
    guard: Semaphore,
    value: AtomicI64,
}

impl Counter {
    /// Create a counter starting at `initial`
    #[must_use]
    pub fn new(initial: i64) -> Self {
        Self {
            guard: Semaphore::new(1),
            value: AtomicI64::new(initial),
        }
    }

    /// Add one, waiting for any update in flight
    pub async fn inc(&self) {
        self.update(1).await;
    }

    /// Subtract one, waiting for any update in flight
    pub async fn dec(&self) {
        self.update(-1).await;
    }

    /// Current value without taking the guard
    ///
    /// Never torn, but an update running concurrently may or may not be
    /// reflected yet.
    #[must_use]
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Current value, read after any update in flight has finished
    pub async fn guarded_value(&self) -> i64 {
        let _permit = self.guard.acquire().await;
        self.value.load(Ordering::Acquire)
    }

    async fn update(&self, delta: i64) {
        let _permit = self.guard.acquire().await;
        // Plain load/store: the guard is what keeps this exclusive.
        let current = self.value.load(Ordering::Relaxed);
        self.value.store(current.wrapping_add(delta), Ordering::Release);
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counter_default_is_zero() {
        assert_eq!(Counter::default().value(), 0);
        assert_eq!(Counter::new(-7).value(), -7);
    }

    #[compio::test]
    async fn test_counter_inc_dec() {
        let counter = Counter::new(5);

        counter.inc().await;
        counter.inc().await;
        assert_eq!(counter.value(), 7);

        counter.dec().await;
        assert_eq!(counter.guarded_value().await, 6);
    }

    #[compio::test]
    async fn test_counter_wraps() {
        let counter = Counter::new(i64::MAX);
        counter.inc().await;
        assert_eq!(counter.value(), i64::MIN);
    }

    #[compio::test]
    async fn test_counter_concurrent_tasks() {
        let counter = Arc::new(Counter::default());

        let mut handles = Vec::new();
        for _ in 0..200 {
            let counter = counter.clone();
            handles.push(compio::runtime::spawn(async move {
                counter.inc().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counter.guarded_value().await, 200);
    }
}
