//! Counting semaphore, guarded counter and per-key locks
//!
//! Synchronization primitives that are safe to share between OS threads and
//! between tasks of the [compio](https://github.com/compio-rs/compio) runtime.
//!
//! # Primitives
//!
//! - [`Semaphore`] - bounded slot pool with bulk, soft-wait and idle-detection helpers
//! - [`Counter`] - integer whose updates are serialized by a one-slot semaphore
//! - [`NumLock`] - mutual exclusion on integer keys
//!
//! # Example
//!
//! ```rust,no_run
//! use semgate_sync::Semaphore;
//!
//! #[compio::main]
//! async fn main() {
//!     let sem = Semaphore::new(100);
//!
//!     // Spawn many tasks, but only 100 run concurrently
//!     for i in 0..1000 {
//!         let sem = sem.clone();
//!         compio::runtime::spawn(async move {
//!             let _permit = sem.acquire().await;
//!             println!("Task {}", i);
//!         })
//!         .detach();
//!     }
//! }
//! ```

mod config;
mod counter;
mod error;
mod numlock;
mod semaphore;
mod until;

pub use config::{SemaphoreConfig, DEFAULT_UNTIL_FREE_TIMEOUT};
pub use counter::Counter;
pub use error::{Result, SyncError};
pub use numlock::NumLock;
pub use semaphore::{Acquire, Semaphore, SemaphorePermit};
pub use until::Until;
