//! Mutual exclusion on integer keys
//!
//! Synchronize on number-identified entities (ports, array slots, record
//! ids) without allocating a lock for each one up front. Each key gets its
//! own one-slot [`Semaphore`] the first time it is locked; the registry of
//! keys is protected by a separate one-slot guard that is only held for the
//! lookup, never while waiting on a key.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::{trace, warn};

use crate::error::{Result, SyncError};
use crate::semaphore::Semaphore;

/// A lock per integer key, created on first use
///
/// Entries are never removed, so memory grows with the number of distinct
/// keys ever locked.
///
/// # Example
///
/// ```rust,no_run
/// use semgate_sync::NumLock;
///
/// # async fn example() -> semgate_sync::Result<()> {
/// let ports = NumLock::new();
///
/// ports.lock(8080).await;
/// // 8443 is independent of 8080
/// ports.lock(8443).await;
///
/// ports.unlock(8080).await?;
/// ports.unlock(8443).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct NumLock {
    registry: Registry,
}

struct Registry {
    guard: Semaphore,
    /// Only locked inside `with`, so never contended
    locks: Mutex<HashMap<i64, Semaphore>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            guard: Semaphore::new(1),
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl Registry {
    /// Run `f` on the map while holding the guard
    async fn with<R>(&self, f: impl FnOnce(&mut HashMap<i64, Semaphore>) -> R) -> R {
        let _permit = self.guard.acquire().await;
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut locks)
    }
}

impl NumLock {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `key`, waiting while another caller holds it
    ///
    /// The registry guard is released before waiting, so locking one key
    /// never waits on a different key.
    pub async fn lock(&self, key: i64) {
        let slot = self
            .registry
            .with(|locks| {
                locks
                    .entry(key)
                    .or_insert_with(|| {
                        trace!(key, "registering key");
                        Semaphore::new(1)
                    })
                    .clone()
            })
            .await;

        slot.lock().await;
    }

    /// Unlock `key`
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownKey`] if `key` was never locked, or
    /// [`SyncError::NotHeld`] if it is known but not currently locked.
    pub async fn unlock(&self, key: i64) -> Result<()> {
        let slot = self.registry.with(|locks| locks.get(&key).cloned()).await;

        match slot {
            Some(slot) => slot.unlock(),
            None => {
                warn!(key, "unlock of a key that was never locked");
                Err(SyncError::UnknownKey(key))
            }
        }
    }

    /// Number of keys ever locked
    pub async fn len(&self) -> usize {
        self.registry.with(|locks| locks.len()).await
    }

    /// Whether no key has been locked yet
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl fmt::Debug for NumLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumLock").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_numlock_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NumLock>();
    }

    #[compio::test]
    async fn test_numlock_lock() {
        let locks = NumLock::new();
        let locked = compio::time::timeout(Duration::from_secs(1), locks.lock(66)).await;
        assert!(locked.is_ok());
    }

    #[compio::test]
    async fn test_numlock_lock_unlock() {
        let locks = NumLock::new();
        locks.lock(66).await;
        assert_eq!(locks.unlock(66).await, Ok(()));
    }

    #[compio::test]
    async fn test_numlock_blocking() {
        let locks = NumLock::new();
        locks.lock(66).await;

        let second = compio::time::timeout(Duration::from_millis(100), locks.lock(66)).await;
        assert!(second.is_err());
    }

    #[compio::test]
    async fn test_numlock_blocking_unlock() {
        let locks = Arc::new(NumLock::new());
        locks.lock(66).await;

        let releaser = locks.clone();
        compio::runtime::spawn(async move {
            compio::time::sleep(Duration::from_millis(50)).await;
            releaser.unlock(66).await.unwrap();
        })
        .detach();

        let second = compio::time::timeout(Duration::from_secs(2), locks.lock(66)).await;
        assert!(second.is_ok());
    }

    #[compio::test]
    async fn test_numlock_keys_are_independent() {
        let locks = NumLock::new();
        locks.lock(1).await;

        // Key 1 is never released; key 2 must not care
        let other = compio::time::timeout(Duration::from_millis(100), locks.lock(2)).await;
        assert!(other.is_ok());
    }

    #[compio::test]
    async fn test_numlock_unlock_unknown_key() {
        let locks = NumLock::new();
        assert_eq!(locks.unlock(7).await, Err(SyncError::UnknownKey(7)));
    }

    #[compio::test]
    async fn test_numlock_unlock_twice() {
        let locks = NumLock::new();
        locks.lock(7).await;
        locks.unlock(7).await.unwrap();

        assert_eq!(
            locks.unlock(7).await,
            Err(SyncError::NotHeld {
                requested: 1,
                held: 0
            })
        );
    }

    #[compio::test]
    async fn test_numlock_keys_accumulate() {
        let locks = NumLock::new();
        assert!(locks.is_empty().await);

        for key in [3, -3, 99] {
            locks.lock(key).await;
            locks.unlock(key).await.unwrap();
        }
        locks.lock(3).await;

        assert_eq!(locks.len().await, 3);
    }
}
