//! Error handling and types

use std::time::Duration;

use thiserror::Error;

/// Misuse and expiry conditions reported by the primitives
///
/// None of these are fatal: the primitive is left in a consistent state and
/// the caller decides whether to retry, log or give up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// More slots were released than are currently held
    #[error("unlock without matching lock: {requested} slot(s) requested, {held} held")]
    NotHeld {
        /// Slots the caller tried to release
        requested: usize,
        /// Slots held at the time of the call
        held: usize,
    },

    /// A `NumLock` key was unlocked before it was ever locked
    #[error("unknown key: {0}")]
    UnknownKey(i64),

    /// A bulk request can never be satisfied by this semaphore
    #[error("requested {requested} slot(s) from a semaphore of capacity {capacity}")]
    ExceedsCapacity {
        /// Slots requested
        requested: usize,
        /// Fixed capacity of the semaphore
        capacity: usize,
    },

    /// A reserved slot was returned because nobody observed it in time
    #[error("reserved slot was reclaimed after {0:?} without being observed")]
    UntilExpired(Duration),
}

/// Result type for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;
