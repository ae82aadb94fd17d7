//! Session lifecycle configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Turns allowed per session
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Idle time after which a session times out, in seconds
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,

    /// How long a completed request is replayed for its key, in seconds
    #[serde(default = "default_idempotency_ttl")]
    pub idempotency_ttl_secs: u64,

    /// How long a pending reservation blocks retries, in seconds
    #[serde(default = "default_idempotency_lease")]
    pub idempotency_lease_secs: u64,

    /// How long a duplicate waits for the original to finish, in milliseconds
    #[serde(default = "default_duplicate_wait")]
    pub duplicate_wait_ms: u64,

    /// Expiry sweep cadence, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// How long past its deadline a session must be before the sweep times it out, in seconds
    #[serde(default = "default_sweep_grace")]
    pub sweep_grace_secs: u64,
}

impl SessionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn duplicate_wait(&self) -> Duration {
        Duration::from_millis(self.duplicate_wait_ms)
    }

    /// Validate session configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_turns == 0 {
            return Err(ValidationError::NotPositive("max_turns"));
        }
        if self.inactivity_timeout_secs == 0 {
            return Err(ValidationError::NotPositive("inactivity_timeout_secs"));
        }
        if self.idempotency_ttl_secs == 0 {
            return Err(ValidationError::NotPositive("idempotency_ttl_secs"));
        }
        if self.idempotency_lease_secs == 0 {
            return Err(ValidationError::NotPositive("idempotency_lease_secs"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::NotPositive("sweep_interval_secs"));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            inactivity_timeout_secs: default_inactivity_timeout(),
            idempotency_ttl_secs: default_idempotency_ttl(),
            idempotency_lease_secs: default_idempotency_lease(),
            duplicate_wait_ms: default_duplicate_wait(),
            sweep_interval_secs: default_sweep_interval(),
            sweep_grace_secs: default_sweep_grace(),
        }
    }
}

fn default_max_turns() -> u32 {
    10
}

fn default_inactivity_timeout() -> u64 {
    1800
}

fn default_idempotency_ttl() -> u64 {
    300
}

fn default_idempotency_lease() -> u64 {
    30
}

fn default_duplicate_wait() -> u64 {
    2000
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_sweep_grace() -> u64 {
    5
}
