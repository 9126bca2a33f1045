//! Manual Message Broker
//!
//! An at-least-once, competing-consumers broker built on a bare [`Transport`]
//! (append-only lists, hashes, sets and a compare-and-apply batch).
//!
//! # Overview
//!
//! - **Streams** are append-only lists of [`Message`]s shared by every consumer group
//! - **Consumer groups** each keep an independent cursor, so every group sees every message
//! - **Deliveries** stay in-flight until acked; nacks schedule a retry with exponential
//!   backoff, and exhausted or timed-out deliveries land in a per-group dead-letter table
//! - **Retries** jump ahead of new messages: they are spliced back in at the group's cursor
//!
//! # Architecture
//!
//! ```text
//!  publish ─► stream:{s}  [ m0 | m1 | m2 | m3 | m4 ]
//!                              ▲              ▲
//!                  position:{s}:billing   position:{s}:audit
//!
//!  get_next(s, g):  reclaim stale ─► requeue ready retries ─► CAS cursor + in-flight
//!  ack(s, id, g):   in-flight ─► gone
//!  nack(s, id, g):  in-flight ─► failed (retry) ─► spliced at cursor ─► in-flight
//!                                    └─► dlq (budget exhausted or timed out)
//! ```
//!
//! # Example Usage
//!
//! ```rust
//! use lanequeue::queue::{Broker, BrokerConfig};
//! use lanequeue::store::MemoryTransport;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = Broker::new("default", Arc::new(MemoryTransport::new()), BrokerConfig::default())?;
//! broker.publish("orders", json!({"order_id": 1})).await?;
//!
//! for message in broker.read("orders", "billing", 10).await? {
//!     if message.payload["order_id"] == 1 {
//!         broker.ack("orders", &message.identifier, "billing").await?;
//!     } else {
//!         broker.nack("orders", &message.identifier, "billing").await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`Transport`]: crate::store::Transport

pub mod api;
mod broker;
mod config;
mod error;
mod group;
mod health;
mod keys;
mod message;
mod recovery;
mod registry;

pub use broker::Broker;
pub use config::BrokerConfig;
pub use error::{BrokerError, BrokerResult};
pub use group::GroupStats;
pub use health::{BrokerHealth, BrokerInfo, MessageCounts, StreamInfo};
pub use message::{DlqRecord, FailureReason, InFlightRecord, Message, OperationState, RetryRecord};
pub use registry::{BrokerRegistry, DEFAULT_BROKER};

#[cfg(test)]
mod tests;
