use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StakeError};

/// Lease time-to-live: 10 minutes.
pub const DEFAULT_LEASE_TTL_MS: u64 = 10 * 60 * 1000;

/// Recommended client renewal interval: 30 seconds.
pub const DEFAULT_HEARTBEAT_MS: u64 = 30 * 1000;

/// Longest accepted lease: one day.
pub const MAX_LEASE_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Number of resources in the default catalog.
pub const DEFAULT_CATALOG_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeConfig {
    pub lease_ttl_ms: u64,
    pub heartbeat_ms: u64,
}

impl StakeConfig {
    pub fn new(lease_ttl_ms: u64, heartbeat_ms: u64) -> Result<Self> {
        let config = Self {
            lease_ttl_ms,
            heartbeat_ms,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_secs(lease_ttl_secs: u64, heartbeat_secs: u64) -> Result<Self> {
        Self::new(secs_to_ms(lease_ttl_secs)?, secs_to_ms(heartbeat_secs)?)
    }

    /// The heartbeat must leave room for at least two missed beats before expiry.
    pub fn validate(&self) -> Result<()> {
        if self.lease_ttl_ms == 0 || self.heartbeat_ms == 0 {
            return Err(StakeError::Invalid(
                "lease ttl and heartbeat interval must be greater than 0".to_string(),
            ));
        }
        if self.lease_ttl_ms > MAX_LEASE_TTL_MS {
            return Err(StakeError::Invalid(format!(
                "lease ttl ({} ms) must be at most {} ms",
                self.lease_ttl_ms, MAX_LEASE_TTL_MS
            )));
        }
        if self.heartbeat_ms > self.lease_ttl_ms / 3 {
            return Err(StakeError::Invalid(format!(
                "heartbeat interval ({} ms) must be at most a third of the lease ttl ({} ms)",
                self.heartbeat_ms, self.lease_ttl_ms
            )));
        }
        Ok(())
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

fn secs_to_ms(secs: u64) -> Result<u64> {
    secs.checked_mul(1000)
        .ok_or_else(|| StakeError::Invalid(format!("{} seconds is out of range", secs)))
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            lease_ttl_ms: DEFAULT_LEASE_TTL_MS,
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
        }
    }
}
