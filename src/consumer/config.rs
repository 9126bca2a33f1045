//! Consumer settings

use crate::consumer::error::{ConsumerError, ConsumerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for a backfill read so a primary arrival is noticed within a second
pub const BACKFILL_TIMEOUT_CAP_MS: u64 = 1000;

/// Stream name suffix used for consumer-side dead-letter streams
pub const DLQ_SUFFIX: &str = "dlq";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityLanesConfig {
    pub enabled: bool,
    /// Backfill stream is `<primary>:<backfill_suffix>`
    pub backfill_suffix: String,
}

impl Default for PriorityLanesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backfill_suffix: "backfill".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Messages requested per read
    pub batch_size: usize,
    pub blocking_timeout_ms: u64,
    /// Handler failures tolerated per message before it is dead-lettered
    pub max_retries: u32,
    pub enable_dlq: bool,
    /// Pause after a failed poll iteration
    pub idle_backoff_ms: u64,
    pub priority_lanes: PriorityLanesConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            blocking_timeout_ms: 5000,
            max_retries: 3,
            enable_dlq: true,
            idle_backoff_ms: 100,
            priority_lanes: PriorityLanesConfig::default(),
        }
    }
}

impl ConsumerConfig {
    pub fn validate(&self) -> ConsumerResult<()> {
        let invalid = |message: String| Err(ConsumerError::Config { message });

        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".to_string());
        }
        let suffix = &self.priority_lanes.backfill_suffix;
        if suffix.is_empty() {
            return invalid("priority_lanes.backfill_suffix must not be empty".to_string());
        }
        if suffix.contains(':') || suffix == DLQ_SUFFIX {
            return invalid(format!(
                "priority_lanes.backfill_suffix '{suffix}' collides with stream naming"
            ));
        }
        Ok(())
    }

    pub fn blocking_timeout(&self) -> Duration {
        Duration::from_millis(self.blocking_timeout_ms)
    }

    /// Blocking timeout for backfill reads, capped at [`BACKFILL_TIMEOUT_CAP_MS`]
    pub fn backfill_timeout(&self) -> Duration {
        Duration::from_millis(self.blocking_timeout_ms.min(BACKFILL_TIMEOUT_CAP_MS))
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn backfill_stream(&self, primary: &str) -> String {
        format!("{primary}:{}", self.priority_lanes.backfill_suffix)
    }
}

pub fn dlq_stream(stream: &str) -> String {
    format!("{stream}:{DLQ_SUFFIX}")
}
