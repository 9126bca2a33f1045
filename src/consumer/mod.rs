//! Stream Consumers
//!
//! A [`StreamConsumer`] drives one [`BatchHandler`] over one stream through the
//! [`BrokerPort`] seam. With priority lanes enabled it also drains a backfill stream,
//! but only while the primary stream has nothing to deliver.
//!
//! # Example Usage
//!
//! ```rust
//! use lanequeue::consumer::{ConsumerConfig, LoggingHandler, PriorityLanesConfig, StreamConsumer};
//! use lanequeue::queue::{Broker, BrokerConfig};
//! use lanequeue::store::MemoryTransport;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = Arc::new(Broker::new("default", Arc::new(MemoryTransport::new()), BrokerConfig::default())?);
//! broker.publish("orders:backfill", json!({"replayed": true})).await?;
//!
//! let config = ConsumerConfig {
//!     priority_lanes: PriorityLanesConfig { enabled: true, ..Default::default() },
//!     ..ConsumerConfig::default()
//! };
//! let mut consumer = StreamConsumer::new(broker, Arc::new(LoggingHandler::default()), "orders", "billing", config)?;
//! consumer.initialize().await?;
//! consumer.poll_once().await;
//! assert_eq!(consumer.active_stream(), "orders:backfill");
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
mod handler;
mod lanes;
mod port;

pub use config::{ConsumerConfig, PriorityLanesConfig};
pub use error::{ConsumerError, ConsumerResult, HandlerError};
pub use handler::{BatchHandler, LoggingHandler};
pub use lanes::{BatchOutcome, PollOutcome, StreamConsumer};
pub use port::BrokerPort;

#[cfg(test)]
mod tests;
