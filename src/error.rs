//! Error handling and types

use semgate_sync::SyncError;
use thiserror::Error;

/// Stress harness errors
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Standard I/O error (thread or runtime creation)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A primitive reported misuse
    #[error("Synchronization error: {0}")]
    Sync(#[from] SyncError),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A primitive broke one of its guarantees during a run
    #[error("Invariant violated: {0}")]
    InvariantViolated(String),

    /// A worker thread or task died
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;
