//! The bounded bitmap pool.
//!
//! At most `capacity` bitmaps are checked out at any instant; an acquirer
//! that finds the pool exhausted is suspended on the pool's [`Semaphore`]
//! until somebody releases. Released bitmaps are erased and kept for reuse
//! by later acquirers asking for the same dimensions and format.

mod config;
mod stats;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};

use crate::bitmap::{Bitmap, BitmapId, PixelFormat};
use crate::error::{PoolError, PoolResult};
use crate::semaphore::Semaphore;

pub use config::PoolConfig;
pub use stats::PoolStats;

#[derive(Clone)]
pub struct BitmapPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: PoolConfig,
    semaphore: Semaphore,
    state: Mutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
    available: VecDeque<Bitmap>,
    // Maps each checked-out id to the generation it was handed out in.
    checked_out: HashMap<BitmapId, u64>,
    // Bitmaps being allocated or erased outside the lock. They count against
    // capacity so eviction never lets the pool overshoot.
    in_flight: usize,
    generation: u64,
    allocations: u64,
    reuses: u64,
    evictions: u64,
    rejected_releases: u64,
}

impl PoolState {
    fn live(&self) -> usize {
        self.available.len() + self.checked_out.len() + self.in_flight
    }
}

impl BitmapPool {
    /// Creates a pool holding at most `capacity` bitmaps.
    pub fn new(capacity: usize) -> PoolResult<Self> {
        Self::with_config(PoolConfig::new(capacity))
    }

    pub fn with_config(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: PoolConfig) -> Self {
        info!(
            "bitmap pool created (capacity {}, format {:?}, enabled {})",
            config.capacity, config.default_format, config.enabled
        );
        BitmapPool {
            inner: Arc::new(PoolInner {
                semaphore: Semaphore::new(config.capacity),
                state: Mutex::new(PoolState::default()),
                config,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    /// Acquires a bitmap in the pool's default format.
    pub async fn acquire(&self, width: u32, height: u32) -> PoolResult<Bitmap> {
        self.acquire_with_format(width, height, self.inner.config.default_format)
            .await
    }

    /// Acquires a zeroed `width` x `height` bitmap, suspending while the pool
    /// is exhausted.
    ///
    /// Dropping the returned future before it completes cancels the request
    /// without consuming any capacity.
    pub async fn acquire_with_format(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> PoolResult<Bitmap> {
        if !self.inner.config.enabled {
            return Ok(Bitmap::transparent());
        }
        Bitmap::byte_len(width, height, format)?;
        self.inner.semaphore.acquire().await;
        self.checkout(width, height, format)
    }

    /// Blocking variant of [`BitmapPool::acquire`] for plain threads. Must not
    /// be called from inside an async runtime.
    pub fn acquire_blocking(&self, width: u32, height: u32) -> PoolResult<Bitmap> {
        futures::executor::block_on(self.acquire(width, height))
    }

    /// Acquires without waiting. Returns `Ok(None)` when the pool is
    /// exhausted or other callers are already queued.
    pub fn try_acquire(&self, width: u32, height: u32) -> PoolResult<Option<Bitmap>> {
        self.try_acquire_with_format(width, height, self.inner.config.default_format)
    }

    pub fn try_acquire_with_format(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> PoolResult<Option<Bitmap>> {
        if !self.inner.config.enabled {
            return Ok(Some(Bitmap::transparent()));
        }
        Bitmap::byte_len(width, height, format)?;
        if !self.inner.semaphore.try_acquire() {
            return Ok(None);
        }
        self.checkout(width, height, format).map(Some)
    }

    pub async fn acquire_timeout(
        &self,
        width: u32,
        height: u32,
        timeout: Duration,
    ) -> PoolResult<Bitmap> {
        self.acquire_timeout_with_format(width, height, self.inner.config.default_format, timeout)
            .await
    }

    /// Like [`BitmapPool::acquire_with_format`], failing with
    /// [`PoolError::Timeout`] once `timeout` elapses. No capacity is consumed
    /// by a request that times out.
    pub async fn acquire_timeout_with_format(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        timeout: Duration,
    ) -> PoolResult<Bitmap> {
        if !self.inner.config.enabled {
            return Ok(Bitmap::transparent());
        }
        Bitmap::byte_len(width, height, format)?;
        if !self.inner.semaphore.acquire_timeout(timeout).await {
            debug!("acquire of {}x{} timed out after {:?}", width, height, timeout);
            return Err(PoolError::Timeout);
        }
        self.checkout(width, height, format)
    }

    // Called with a permit held. On failure the permit goes back.
    fn checkout(&self, width: u32, height: u32, format: PixelFormat) -> PoolResult<Bitmap> {
        let result = self.take_or_allocate(width, height, format);
        if let Err(err) = &result {
            debug!("checkout of {}x{} failed: {}", width, height, err);
            if let Err(release_err) = self.inner.semaphore.release() {
                warn!("could not return permit after failed checkout: {}", release_err);
            }
        }
        result
    }

    fn take_or_allocate(&self, width: u32, height: u32, format: PixelFormat) -> PoolResult<Bitmap> {
        let mut state = self.lock();
        let matching = state
            .available
            .iter()
            .position(|bitmap| bitmap.matches(width, height, format));
        if let Some(bitmap) = matching.and_then(|index| state.available.remove(index)) {
            let generation = state.generation;
            state.checked_out.insert(bitmap.id(), generation);
            state.reuses += 1;
            debug!("reused bitmap {} ({}x{})", bitmap.id(), width, height);
            return Ok(bitmap);
        }

        while state.live() >= self.inner.config.capacity {
            match state.available.pop_front() {
                Some(evicted) => {
                    state.evictions += 1;
                    debug!(
                        "evicted idle bitmap {} ({}x{}) to make room",
                        evicted.id(),
                        evicted.width(),
                        evicted.height()
                    );
                }
                None => break,
            }
        }
        state.in_flight += 1;
        drop(state);

        let allocated = Bitmap::new(width, height, format);

        let mut state = self.lock();
        state.in_flight -= 1;
        let bitmap = allocated?;
        let generation = state.generation;
        state.checked_out.insert(bitmap.id(), generation);
        state.allocations += 1;
        debug!("allocated bitmap {} ({}x{} {:?})", bitmap.id(), width, height, format);
        Ok(bitmap)
    }

    /// Returns a bitmap to the pool.
    ///
    /// The bitmap must have come from [`BitmapPool::acquire`] on this pool
    /// and not have been released since; anything else is rejected with
    /// [`PoolError::NotCheckedOut`] and leaves the pool untouched. Contents
    /// are erased before the bitmap becomes available again.
    pub fn release(&self, mut bitmap: Bitmap) -> PoolResult<()> {
        let id = bitmap.id();
        if !self.inner.config.enabled {
            if bitmap.is_placeholder() {
                return Ok(());
            }
            self.lock().rejected_releases += 1;
            warn!("rejected release of bitmap {}: pool is disabled", id);
            return Err(PoolError::NotCheckedOut { id });
        }

        let generation = {
            let mut state = self.lock();
            match state.checked_out.remove(&id) {
                Some(generation) => {
                    state.in_flight += 1;
                    generation
                }
                None => {
                    state.rejected_releases += 1;
                    warn!("rejected release of bitmap {}: not checked out", id);
                    return Err(PoolError::NotCheckedOut { id });
                }
            }
        };

        bitmap.erase();

        {
            let mut state = self.lock();
            state.in_flight -= 1;
            if generation == state.generation {
                state.available.push_back(bitmap);
            } else {
                debug!("dropped bitmap {} released after clear", id);
            }
        }

        // Only now is the bitmap back, so a woken acquirer can find it.
        self.inner.semaphore.release()
    }

    /// Drops every idle bitmap.
    ///
    /// Bitmaps that are checked out stay valid; when they come back they
    /// free their slot but are not pooled again.
    pub fn clear(&self) {
        if !self.inner.config.enabled {
            return;
        }
        let mut state = self.lock();
        let dropped = state.available.len();
        state.available.clear();
        state.generation += 1;
        info!(
            "bitmap pool cleared ({} idle dropped, {} still checked out)",
            dropped,
            state.checked_out.len()
        );
    }

    pub fn is_checked_out(&self, bitmap: &Bitmap) -> bool {
        self.lock().checked_out.contains_key(&bitmap.id())
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = {
            let state = self.lock();
            PoolStats {
                capacity: self.inner.config.capacity,
                checked_out: state.checked_out.len(),
                available: state.available.len(),
                allocations: state.allocations,
                reuses: state.reuses,
                evictions: state.evictions,
                rejected_releases: state.rejected_releases,
                generation: state.generation,
                ..PoolStats::default()
            }
        };
        stats.available_permits = self.inner.semaphore.available_permits();
        stats.waiters = self.inner.semaphore.waiters();
        stats
    }
}

impl Default for BitmapPool {
    fn default() -> Self {
        Self::from_valid_config(PoolConfig::default())
    }
}

impl std::fmt::Debug for BitmapPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitmapPool")
            .field("config", &self.inner.config)
            .field("semaphore", &self.inner.semaphore)
            .finish()
    }
}
