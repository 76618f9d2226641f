//! Background slot reservation with an abandonment timeout
//!
//! [`Semaphore::until`](crate::Semaphore::until) starts a task that waits
//! for a slot on the caller's behalf. The reservation moves through
//! `WAITING -> RESERVED -> CLAIMED` when the caller observes it in time, or
//! `RESERVED -> RECLAIMED` when the grace window runs out first. Exactly one
//! side wins the `RESERVED` transition, so the slot is either handed to the
//! caller or returned to the pool, never both.

use std::future::Future;
use std::pin::{pin, Pin};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, Either};
use futures::task::AtomicWaker;
use tracing::{debug, trace, warn};

use crate::error::{Result, SyncError};
use crate::semaphore::Semaphore;

const WAITING: u8 = 0;
const RESERVED: u8 = 1;
const CLAIMED: u8 = 2;
const RECLAIMED: u8 = 3;

struct Reservation {
    state: AtomicU8,
    waker: AtomicWaker,
}

impl Reservation {
    fn transition(&self, from: u8, to: u8) -> bool {
        let won = self
            .state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.waker.wake();
        }
        won
    }
}

/// Future returned by [`Semaphore::until`](crate::Semaphore::until)
///
/// Resolves `Ok(())` once a slot has been consumed for the caller, who then
/// owns it. Resolves [`SyncError::UntilExpired`] if the slot was reclaimed
/// before this future observed it. Dropping it gives up the reservation.
#[must_use = "an unobserved reservation is handed back after the abandonment timeout"]
pub struct Until {
    reservation: Arc<Reservation>,
    timeout: Duration,
    /// Dropping the sender tells the background task nobody is listening
    _abandon: oneshot::Sender<()>,
}

impl Until {
    /// Start reserving a slot of `semaphore` on the current runtime
    pub(crate) fn spawn(semaphore: Semaphore) -> Self {
        let reservation = Arc::new(Reservation {
            state: AtomicU8::new(WAITING),
            waker: AtomicWaker::new(),
        });
        let (abandon, abandoned) = oneshot::channel();
        let timeout = semaphore.config().until_free_timeout;

        compio::runtime::spawn(reserve(semaphore, reservation.clone(), abandoned, timeout))
            .detach();

        Self {
            reservation,
            timeout,
            _abandon: abandon,
        }
    }
}

/// Returns the reserved slot unless the caller claimed it first
///
/// Runs when `reserve` finishes and also when its task is dropped before
/// finishing, e.g. on runtime shutdown.
struct Reclaim<'a> {
    semaphore: &'a Semaphore,
    reservation: &'a Reservation,
}

impl Drop for Reclaim<'_> {
    fn drop(&mut self) {
        if self.reservation.transition(RESERVED, RECLAIMED) {
            debug!(
                semaphore = %self.semaphore,
                "until reservation not observed, returning slot"
            );
            give_back(self.semaphore);
        }
    }
}

fn give_back(semaphore: &Semaphore) {
    if let Err(err) = semaphore.release(1) {
        warn!(%err, "failed to return reserved slot");
    }
}

async fn reserve(
    semaphore: Semaphore,
    reservation: Arc<Reservation>,
    mut abandoned: oneshot::Receiver<()>,
    timeout: Duration,
) {
    match future::select(semaphore.acquire(), &mut abandoned).await {
        // From here on the slot is accounted for by the reservation state
        Either::Left((permit, _)) => permit.forget(),
        Either::Right(_) => {
            trace!("until abandoned before a slot was free");
            return;
        }
    }

    if !reservation.transition(WAITING, RESERVED) {
        give_back(&semaphore);
        return;
    }
    let _reclaim = Reclaim {
        semaphore: &semaphore,
        reservation: &reservation,
    };
    debug!(?timeout, "slot reserved for until");

    let _ = future::select(pin!(compio::time::sleep(timeout)), &mut abandoned).await;
}

impl Future for Until {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.reservation.waker.register(cx.waker());

        match self.reservation.state.compare_exchange(
            RESERVED,
            CLAIMED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) | Err(CLAIMED) => Poll::Ready(Ok(())),
            Err(RECLAIMED) => Poll::Ready(Err(SyncError::UntilExpired(self.timeout))),
            Err(_) => Poll::Pending,
        }
    }
}
