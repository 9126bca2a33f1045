//! Message and bookkeeping record types
//!
//! Everything here is stored as JSON in the transport; field names are part of the
//! wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A published message: an identifier chosen by the publisher plus an opaque payload
///
/// # Example
///
/// ```rust
/// use lanequeue::queue::Message;
/// use serde_json::json;
///
/// let message = Message::new(json!({"order_id": 42}));
/// assert_eq!(message.identifier.len(), 36);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub identifier: String,
    pub payload: Value,
}

impl Message {
    pub fn new(payload: Value) -> Self {
        Self {
            identifier: Uuid::new_v4().to_string(),
            payload,
        }
    }

    pub fn with_identifier(identifier: impl Into<String>, payload: Value) -> Self {
        Self {
            identifier: identifier.into(),
            payload,
        }
    }
}

/// Delivered to a consumer group, not yet acked or nacked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InFlightRecord {
    pub identifier: String,
    pub payload: Value,
    pub delivered_at: f64,
}

/// Nacked and waiting for `next_retry_time`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryRecord {
    pub identifier: String,
    pub payload: Value,
    pub retry_count: u32,
    pub next_retry_time: f64,
}

/// Why a message ended up in the dead-letter table
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureReason {
    /// Retry budget exhausted by repeated nacks
    MaxRetriesExceeded,
    /// Delivered but never acked or nacked within the message timeout
    Timeout,
}

/// Terminal record for a message that will not be redelivered automatically
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqRecord {
    pub identifier: String,
    pub payload: Value,
    pub failure_reason: FailureReason,
    pub timestamp: f64,
}

impl DlqRecord {
    pub fn into_message(self) -> Message {
        Message::with_identifier(self.identifier, self.payload)
    }
}

/// Short-lived marker used to make ack/nack re-submission idempotent
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    Delivered,
    Acked,
    Retrying,
    Dlq,
}
