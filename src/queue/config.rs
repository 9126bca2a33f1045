//! Broker engine settings

use crate::queue::error::{BrokerError, BrokerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Floor for the ownership record expiry
const MIN_OWNERSHIP_TTL_SECONDS: f64 = 30.0;

/// Tunables for a single [`Broker`](crate::queue::Broker)
///
/// Every field has a default so a `[brokers.<name>]` table may set only what it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Nacks allowed before a message is dead-lettered
    pub max_retries: u32,
    /// Base delay for the first retry; doubles with every further retry
    pub retry_delay_seconds: f64,
    /// Seconds a delivery may stay unacknowledged before it is reclaimed
    pub message_timeout: f64,
    pub enable_dlq: bool,
    pub operation_state_ttl_seconds: u64,
    pub blocking_poll_interval_ms: u64,
    pub cas_max_attempts: usize,
    pub cas_base_delay_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_seconds: 1.0,
            message_timeout: 300.0,
            enable_dlq: true,
            operation_state_ttl_seconds: 60,
            blocking_poll_interval_ms: 50,
            cas_max_attempts: 16,
            cas_base_delay_ms: 2,
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> BrokerResult<()> {
        let invalid = |message: &str| {
            Err(BrokerError::Config {
                message: message.to_string(),
            })
        };

        if !self.retry_delay_seconds.is_finite() || self.retry_delay_seconds < 0.0 {
            return invalid("retry_delay_seconds must be a non-negative number");
        }
        if !self.message_timeout.is_finite() || self.message_timeout <= 0.0 {
            return invalid("message_timeout must be a positive number of seconds");
        }
        if self.operation_state_ttl_seconds == 0 {
            return invalid("operation_state_ttl_seconds must be at least 1");
        }
        if self.blocking_poll_interval_ms == 0 {
            return invalid("blocking_poll_interval_ms must be at least 1");
        }
        if self.cas_max_attempts == 0 {
            return invalid("cas_max_attempts must be at least 1");
        }
        Ok(())
    }

    /// Delay before the `retry_count`-th retry (1-based)
    pub fn retry_backoff_seconds(&self, retry_count: u32) -> f64 {
        let exponent = retry_count.saturating_sub(1).min(62) as i32;
        self.retry_delay_seconds * 2f64.powi(exponent)
    }

    pub fn ownership_ttl(&self) -> Duration {
        Duration::from_secs_f64((2.0 * self.message_timeout).max(MIN_OWNERSHIP_TTL_SECONDS))
    }

    pub fn operation_state_ttl(&self) -> Duration {
        Duration::from_secs(self.operation_state_ttl_seconds)
    }

    pub fn blocking_poll_interval(&self) -> Duration {
        Duration::from_millis(self.blocking_poll_interval_ms.max(1))
    }
}
