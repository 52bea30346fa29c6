//! A counting semaphore whose `acquire` suspends instead of blocking.
//!
//! Built on [`tokio::sync::Semaphore`], which queues waiters in arrival
//! order and hands a released permit straight to the oldest one, so a
//! caller arriving later can never take it first. Dropping a pending
//! `acquire` cancels it; a permit already assigned to it moves on to the
//! next waiter.
//!
//! Permits are not tied to a guard. Callers pair every successful acquire
//! with an explicit [`Semaphore::release`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{trace, warn};
use tokio::sync::Semaphore as TokioSemaphore;

use crate::error::{PoolError, PoolResult};

pub struct Semaphore {
    capacity: usize,
    inner: TokioSemaphore,
    // Permits acquired and not yet released.
    held: AtomicUsize,
    waiters: AtomicUsize,
}

// Counts a caller as waiting for as long as it is suspended, including when
// its future is dropped mid-wait.
struct WaitGuard<'a>(&'a AtomicUsize);

impl<'a> WaitGuard<'a> {
    fn new(waiters: &'a AtomicUsize) -> Self {
        waiters.fetch_add(1, Ordering::SeqCst);
        WaitGuard(waiters)
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Semaphore {
    /// The largest capacity the underlying tokio semaphore accepts.
    pub const MAX_CAPACITY: usize = TokioSemaphore::MAX_PERMITS;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: TokioSemaphore::new(capacity),
            held: AtomicUsize::new(0),
            waiters: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_permits(&self) -> usize {
        self.inner.available_permits()
    }

    /// Number of callers currently suspended in [`Semaphore::acquire`].
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    /// Waits for a permit.
    ///
    /// Cancel-safe: dropping the future before it completes never consumes
    /// a permit.
    pub async fn acquire(&self) {
        if self.try_acquire() {
            return;
        }
        let _waiting = WaitGuard::new(&self.waiters);
        trace!("no permit free, waiting ({} queued)", self.waiters());
        match self.inner.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => unreachable!("bitmap semaphore is never closed"),
        }
        self.held.fetch_add(1, Ordering::SeqCst);
    }

    /// Takes a permit only if one is free and nobody is queued ahead.
    pub fn try_acquire(&self) -> bool {
        match self.inner.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.held.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(_) => false,
        }
    }

    /// Like [`Semaphore::acquire`], giving up after `timeout`. Must be called
    /// from within a tokio runtime.
    pub async fn acquire_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.acquire()).await.is_ok()
    }

    /// Returns a permit, waking the oldest waiter if there is one.
    ///
    /// Releasing more permits than were acquired is rejected and leaves the
    /// count untouched.
    pub fn release(&self) -> PoolResult<()> {
        let released = self
            .held
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |held| held.checked_sub(1));
        if released.is_err() {
            warn!("semaphore over-released (capacity {})", self.capacity);
            return Err(PoolError::SemaphoreOverflow {
                capacity: self.capacity,
            });
        }
        self.inner.add_permits(1);
        Ok(())
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("capacity", &self.capacity)
            .field("permits", &self.available_permits())
            .field("waiters", &self.waiters())
            .finish()
    }
}
