//! Counting semaphore with a FIFO wait queue
//!
//! A fixed pool of slots. `lock`/`acquire` consume a slot, waiting when none
//! are free; `unlock`/permit drop give one back and wake the oldest waiter.
//! The futures are plain waker-based futures, so they can be driven by a
//! compio runtime, by `futures::executor::block_on` on an OS thread, or by
//! any other executor. Only [`Semaphore::until`] and [`Semaphore::is_free`]
//! need compio, for its timers.
//!
//! # Example
//!
//! ```rust,no_run
//! use semgate_sync::Semaphore;
//!
//! # async fn example() -> semgate_sync::Result<()> {
//! let sem = Semaphore::new(4);
//!
//! sem.lock().await;
//! assert_eq!(sem.free(), 3);
//! sem.unlock()?;
//!
//! // RAII form: the slot goes back when the permit drops
//! let permit = sem.acquire().await;
//! drop(permit);
//! assert_eq!(sem.free(), 4);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use tracing::{trace, warn};

use crate::config::SemaphoreConfig;
use crate::error::{Result, SyncError};
use crate::until::Until;

/// A bounded pool of slots shared by every clone
///
/// # Design
///
/// - **One lock for the pool**: the wait queue and the held count change
///   together under a single mutex that is never held across an `.await`
/// - **Lock-free reads**: `held` is mirrored in an atomic so [`free`](Self::free)
///   never waits
/// - **FIFO waiters**: a release notifies the oldest waiter that has not been
///   notified yet; a notified waiter that goes away passes the notification on
/// - **Cloneable**: clones share the same pool
#[derive(Clone)]
pub struct Semaphore {
    /// Shared state between all clones of this semaphore
    inner: Arc<SemaphoreInner>,
}

struct SemaphoreInner {
    capacity: usize,
    /// Consumed slots; only written while `queue` is locked
    held: AtomicUsize,
    queue: Mutex<WaitQueue>,
    config: SemaphoreConfig,
}

#[derive(Default)]
struct WaitQueue {
    waiters: VecDeque<Waiter>,
    next_id: u64,
}

struct Waiter {
    id: u64,
    waker: Waker,
    /// A release has already been earmarked for this waiter
    notified: bool,
}

impl WaitQueue {
    fn push(&mut self, waker: Waker) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.waiters.push_back(Waiter {
            id,
            waker,
            notified: false,
        });
        id
    }

    /// Re-arm a waiter that was polled but lost the slot, keeping its place
    fn refresh(&mut self, id: u64, waker: &Waker) -> u64 {
        match self.waiters.iter_mut().find(|w| w.id == id) {
            Some(waiter) => {
                if !waiter.waker.will_wake(waker) {
                    waiter.waker = waker.clone();
                }
                waiter.notified = false;
                id
            }
            None => self.push(waker.clone()),
        }
    }

    fn remove(&mut self, id: u64) -> Option<Waiter> {
        let pos = self.waiters.iter().position(|w| w.id == id)?;
        self.waiters.remove(pos)
    }

    /// Earmark up to `count` waiters in arrival order and collect their wakers
    fn notify(&mut self, count: usize, wakers: &mut Vec<Waker>) {
        for waiter in self
            .waiters
            .iter_mut()
            .filter(|w| !w.notified)
            .take(count)
        {
            waiter.notified = true;
            wakers.push(waiter.waker.clone());
        }
    }
}

impl SemaphoreInner {
    fn queue(&self) -> MutexGuard<'_, WaitQueue> {
        // The queue is consistent between statements, so a panic elsewhere
        // never leaves it half-updated.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume a slot if one is free. Taking the queue proves the lock is held.
    fn take_slot(&self, _queue: &mut WaitQueue) -> bool {
        let held = self.held.load(Ordering::Relaxed);
        if held < self.capacity {
            self.held.store(held + 1, Ordering::Release);
            true
        } else {
            false
        }
    }
}

impl Semaphore {
    /// Create a semaphore with `capacity` free slots and default configuration
    ///
    /// A capacity of 0 is allowed; `lock` on such a semaphore never completes.
    ///
    /// # Example
    ///
    /// ```rust
    /// use semgate_sync::Semaphore;
    ///
    /// let sem = Semaphore::new(1024);
    /// assert_eq!(sem.free(), 1024);
    /// ```
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_config(capacity, SemaphoreConfig::default())
    }

    /// Create a semaphore with an explicit configuration
    #[must_use]
    pub fn with_config(capacity: usize, config: SemaphoreConfig) -> Self {
        Self {
            inner: Arc::new(SemaphoreInner {
                capacity,
                held: AtomicUsize::new(0),
                queue: Mutex::new(WaitQueue::default()),
                config,
            }),
        }
    }

    /// Wait for a slot and return a permit that gives it back on drop
    ///
    /// Dropping the returned future before it completes removes the caller
    /// from the wait queue without consuming anything.
    pub fn acquire(&self) -> Acquire {
        Acquire {
            semaphore: self.clone(),
            waiter: None,
        }
    }

    /// Wait for a slot and consume it
    ///
    /// The slot stays held until a matching [`unlock`](Self::unlock).
    pub async fn lock(&self) {
        self.acquire().await.forget();
    }

    /// Take a slot without waiting
    ///
    /// Returns `None` if every slot is held.
    ///
    /// # Example
    ///
    /// ```rust
    /// use semgate_sync::Semaphore;
    ///
    /// let sem = Semaphore::new(1);
    ///
    /// let permit1 = sem.try_acquire();
    /// assert!(permit1.is_some());
    ///
    /// let permit2 = sem.try_acquire();
    /// assert!(permit2.is_none());
    /// ```
    #[must_use]
    pub fn try_acquire(&self) -> Option<SemaphorePermit> {
        let mut queue = self.inner.queue();
        if self.inner.take_slot(&mut queue) {
            Some(SemaphorePermit::new(self.clone()))
        } else {
            None
        }
    }

    /// Release one held slot
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotHeld`] if no slot is currently held.
    pub fn unlock(&self) -> Result<()> {
        self.release(1)
    }

    /// Consume `count` slots, one at a time
    ///
    /// Other callers may take slots in between. If the future is dropped
    /// before it finishes, the slots it already took are released.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ExceedsCapacity`] if `count` is larger than the
    /// capacity, since such a request could never complete.
    pub async fn add(&self, count: usize) -> Result<()> {
        self.check_capacity(count)?;
        let mut taken = PartialAdd {
            semaphore: self,
            taken: 0,
        };
        while taken.taken < count {
            self.acquire().await.forget();
            taken.taken += 1;
        }
        taken.keep();
        Ok(())
    }

    /// Release `count` held slots
    ///
    /// All or nothing: when fewer than `count` slots are held, nothing is
    /// released.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ExceedsCapacity`] if `count` is larger than the
    /// capacity, or [`SyncError::NotHeld`] if fewer than `count` are held.
    pub fn sub(&self, count: usize) -> Result<()> {
        self.check_capacity(count)?;
        self.release(count)
    }

    /// Number of free slots right now
    ///
    /// Advisory only: the value may change immediately after it is read.
    #[must_use]
    pub fn free(&self) -> usize {
        self.inner.capacity.saturating_sub(self.held())
    }

    /// Number of held slots right now. Advisory, like [`free`](Self::free).
    #[must_use]
    pub fn held(&self) -> usize {
        self.inner.held.load(Ordering::Acquire)
    }

    /// Fixed number of slots
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Tunables this semaphore was created with
    #[must_use]
    pub fn config(&self) -> SemaphoreConfig {
        self.inner.config
    }

    /// Reserve a slot in the background and return a future that reports it
    ///
    /// The reservation starts immediately. Once a slot is consumed on the
    /// caller's behalf, the returned [`Until`] resolves `Ok(())` and the
    /// caller owns that slot (release it with [`unlock`](Self::unlock)). If
    /// the `Until` is not polled within
    /// [`until_free_timeout`](SemaphoreConfig::until_free_timeout) of the
    /// reservation, the slot is returned to the pool and the future resolves
    /// to [`SyncError::UntilExpired`]. This is inherently racy: a slow
    /// observer can lose the slot.
    ///
    /// # Panics
    ///
    /// Panics if called outside a compio runtime.
    pub fn until(&self) -> Until {
        Until::spawn(self.clone())
    }

    /// Resolve once the semaphore looks idle
    ///
    /// Samples the held count every `window / 2` and resolves after two
    /// consecutive samples saw no held slots. A heuristic: a burst that
    /// starts and finishes between samples goes unnoticed.
    ///
    /// The returned future must be driven by a compio runtime.
    pub fn is_free(&self, window: Duration) -> impl Future<Output = ()> + 'static {
        let semaphore = self.clone();
        let interval = window / 2;
        async move {
            let mut idle_before = false;
            loop {
                compio::time::sleep(interval).await;
                let idle = semaphore.held() == 0;
                if idle && idle_before {
                    trace!("semaphore observed idle");
                    return;
                }
                idle_before = idle;
            }
        }
    }

    fn check_capacity(&self, count: usize) -> Result<()> {
        if count > self.inner.capacity {
            return Err(SyncError::ExceedsCapacity {
                requested: count,
                capacity: self.inner.capacity,
            });
        }
        Ok(())
    }

    /// Give back `count` slots and wake as many waiters
    pub(crate) fn release(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }

        let mut wakers = Vec::new();
        {
            let mut queue = self.inner.queue();
            let held = self.inner.held.load(Ordering::Relaxed);
            if held < count {
                drop(queue);
                warn!(requested = count, held, "unlock without matching lock");
                return Err(SyncError::NotHeld {
                    requested: count,
                    held,
                });
            }
            self.inner.held.store(held - count, Ordering::Release);
            queue.notify(count, &mut wakers);
        }

        trace!(released = count, woken = wakers.len(), "released slots");
        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }
}

impl fmt::Display for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} free", self.free(), self.capacity())
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("capacity", &self.capacity())
            .field("held", &self.held())
            .finish()
    }
}

/// Returns the slots of an unfinished `add` if its future is dropped
struct PartialAdd<'a> {
    semaphore: &'a Semaphore,
    taken: usize,
}

impl PartialAdd<'_> {
    fn keep(&mut self) {
        self.taken = 0;
    }
}

impl Drop for PartialAdd<'_> {
    fn drop(&mut self) {
        if self.taken == 0 {
            return;
        }
        trace!(taken = self.taken, "add cancelled, returning slots");
        if let Err(err) = self.semaphore.release(self.taken) {
            warn!(%err, "could not return slots of a cancelled add");
        }
    }
}

/// RAII guard that gives its slot back on drop
///
/// Returned by [`Semaphore::acquire`] and [`Semaphore::try_acquire`].
///
/// # Example
///
/// ```rust,no_run
/// use semgate_sync::Semaphore;
///
/// # async fn example() {
/// let sem = Semaphore::new(10);
///
/// {
///     let permit = sem.acquire().await;
///     // Permit is held here
/// } // Permit released automatically when scope ends
///
/// assert_eq!(sem.free(), 10);
/// # }
/// ```
#[must_use = "dropping a permit releases its slot immediately"]
pub struct SemaphorePermit {
    /// `None` once the slot has been detached with `forget`
    semaphore: Option<Semaphore>,
}

impl SemaphorePermit {
    fn new(semaphore: Semaphore) -> Self {
        Self {
            semaphore: Some(semaphore),
        }
    }

    /// Keep the slot held without a guard
    ///
    /// The slot then has to be released with [`Semaphore::unlock`].
    pub fn forget(mut self) {
        self.semaphore = None;
    }
}

impl Drop for SemaphorePermit {
    fn drop(&mut self) {
        if let Some(semaphore) = self.semaphore.take() {
            if let Err(err) = semaphore.release(1) {
                warn!(%err, "permit dropped into a semaphore with no held slots");
            }
        }
    }
}

impl fmt::Debug for SemaphorePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemaphorePermit")
            .field("attached", &self.semaphore.is_some())
            .finish()
    }
}

/// Future returned by [`Semaphore::acquire`]
///
/// 1. Take a free slot if there is one
/// 2. Otherwise join the wait queue (or refresh its place) and return `Pending`
/// 3. A release wakes the waiter, which retries from step 1
#[must_use = "futures do nothing unless polled"]
pub struct Acquire {
    semaphore: Semaphore,
    /// Queue entry, present while waiting
    waiter: Option<u64>,
}

impl Future for Acquire {
    type Output = SemaphorePermit;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let mut queue = this.semaphore.inner.queue();

        if this.semaphore.inner.take_slot(&mut queue) {
            if let Some(id) = this.waiter.take() {
                queue.remove(id);
            }
            drop(queue);
            return Poll::Ready(SemaphorePermit::new(this.semaphore.clone()));
        }

        this.waiter = Some(match this.waiter {
            Some(id) => queue.refresh(id, cx.waker()),
            None => {
                trace!(waiting = queue.waiters.len() + 1, "no free slot, queueing");
                queue.push(cx.waker().clone())
            }
        });
        Poll::Pending
    }
}

impl Drop for Acquire {
    fn drop(&mut self) {
        let Some(id) = self.waiter.take() else {
            return;
        };

        let mut wakers = Vec::new();
        {
            let mut queue = self.semaphore.inner.queue();
            let was_notified = queue.remove(id).is_some_and(|w| w.notified);
            // A release was earmarked for us; hand it to the next in line.
            if was_notified && self.semaphore.free() > 0 {
                queue.notify(1, &mut wakers);
            }
        }
        for waker in wakers {
            waker.wake();
        }
    }
}

impl fmt::Debug for Acquire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquire")
            .field("semaphore", &self.semaphore)
            .field("queued", &self.waiter.is_some())
            .finish()
    }
}
