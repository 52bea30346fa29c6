use serde::Serialize;

use crate::error::PoolResult;

/// Point-in-time view of a pool's bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub checked_out: usize,
    pub available: usize,
    pub available_permits: usize,
    pub waiters: usize,
    pub allocations: u64,
    pub reuses: u64,
    pub evictions: u64,
    pub rejected_releases: u64,
    pub generation: u64,
}

impl PoolStats {
    pub fn to_json(&self) -> PoolResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
