//! semgate: stress harness for the `semgate-sync` primitives
//!
//! Drives the semaphore, guarded counter and per-key lock from many OS
//! threads at once (one compio runtime per thread) and checks their
//! guarantees while they are under load.

pub mod cli;
pub mod error;
pub mod progress;
pub mod stress;

// Re-export commonly used types
pub use error::{HarnessError, Result};
pub use stress::{run, StressReport};
