//! # snapshot-pool
//!
//! A bounded pool of reusable pixel buffers for concurrent snapshot
//! rendering.
//!
//! ## Features
//!
//! - Caps the number of live bitmaps, checked out or idle
//! - Acquirers suspend (async) or block (threads) while the pool is exhausted
//! - Strict FIFO wake-up, cancel-safe waits
//! - Released bitmaps are erased before reuse
//! - Invalid releases are rejected without touching pool state
//!
//! ## Quick Start
//!
//! ```rust
//! use snapshot_pool::BitmapPool;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), snapshot_pool::PoolError> {
//! let pool = BitmapPool::new(4)?;
//!
//! let mut frame = pool.acquire(64, 64).await?;
//! frame.fill(&[255, 0, 0, 255]);
//!
//! // Hand it back; the next acquirer gets a zeroed buffer.
//! pool.release(frame)?;
//! # Ok(())
//! # }
//! ```

pub mod bitmap;
pub mod error;
pub mod pool;
pub mod semaphore;

pub use bitmap::{Bitmap, BitmapId, PixelFormat};
pub use error::{PoolError, PoolResult};
pub use pool::{BitmapPool, PoolConfig, PoolStats};
pub use semaphore::Semaphore;
