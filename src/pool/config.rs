use serde::{Deserialize, Serialize};

use crate::bitmap::PixelFormat;
use crate::error::{PoolError, PoolResult};
use crate::semaphore::Semaphore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of bitmaps the pool keeps alive, checked out or idle.
    pub capacity: usize,
    pub default_format: PixelFormat,
    /// When false the pool hands out the transparent placeholder
    /// instead of real storage.
    pub enabled: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            default_format: PixelFormat::Rgba8888,
            enabled: true,
        }
    }
}

impl PoolConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn format(mut self, format: PixelFormat) -> Self {
        self.default_format = format;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Parses a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> PoolResult<Self> {
        let config: PoolConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "capacity must be at least 1".to_string(),
            ));
        }
        if self.capacity > Semaphore::MAX_CAPACITY {
            return Err(PoolError::InvalidConfig(format!(
                "capacity {} exceeds the maximum of {}",
                self.capacity,
                Semaphore::MAX_CAPACITY
            )));
        }
        Ok(())
    }
}
