use std::fmt;

use crate::bitmap::BitmapId;

#[derive(Debug)]
pub enum PoolError {
    InvalidDimensions { width: u32, height: u32 },
    OutOfMemory { bytes: usize },
    NotCheckedOut { id: BitmapId },
    SemaphoreOverflow { capacity: usize },
    Timeout,
    InvalidConfig(String),
    Config(serde_json::Error),
}

impl PoolError {
    /// Whether the caller handed the pool something it cannot accept, as
    /// opposed to the pool running out of a resource.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            PoolError::InvalidDimensions { .. }
                | PoolError::NotCheckedOut { .. }
                | PoolError::SemaphoreOverflow { .. }
                | PoolError::InvalidConfig(_)
                | PoolError::Config(_)
        )
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::InvalidDimensions { width, height } => {
                write!(f, "Invalid bitmap dimensions: {}x{}", width, height)
            }
            PoolError::OutOfMemory { bytes } => {
                write!(f, "Out of memory allocating {} bytes of pixel storage", bytes)
            }
            PoolError::NotCheckedOut { id } => {
                write!(f, "Bitmap {} is not checked out from this pool", id)
            }
            PoolError::SemaphoreOverflow { capacity } => {
                write!(f, "Semaphore released beyond its capacity of {}", capacity)
            }
            PoolError::Timeout => write!(f, "Timed out waiting for a free bitmap"),
            PoolError::InvalidConfig(msg) => write!(f, "Invalid pool config: {}", msg),
            PoolError::Config(err) => write!(f, "Config parse error: {}", err),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::Config(err)
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
