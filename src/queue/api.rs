//! Public API for the broker engine
//!
//! External modules should import from here rather than directly from internal modules.

// Engine
pub use crate::queue::broker::Broker;
pub use crate::queue::config::BrokerConfig;
pub use crate::queue::registry::{BrokerRegistry, DEFAULT_BROKER};

// Message and record types
pub use crate::queue::message::{
    DlqRecord, FailureReason, InFlightRecord, Message, OperationState, RetryRecord,
};

// Reports
pub use crate::queue::group::GroupStats;
pub use crate::queue::health::{BrokerHealth, BrokerInfo, MessageCounts, StreamInfo};

// Error handling
pub use crate::queue::error::{BrokerError, BrokerResult};
