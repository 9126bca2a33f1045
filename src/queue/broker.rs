//! Broker - manual at-least-once message broker over a shared transport
//!
//! The broker turns the transport's append-only lists into competing-consumer queues.
//! Each consumer group keeps its own cursor into a stream; a delivery is tracked as
//! in-flight until it is acked, nacked into the retry table, or reclaimed after the
//! message timeout.

use crate::core::retry::{retry_async_if, RetryPolicy};
use crate::core::time::{SystemTimeProvider, TimeProvider};
use crate::queue::config::BrokerConfig;
use crate::queue::error::{BrokerError, BrokerResult};
use crate::queue::group::{parse_position, ConsumerGroup};
use crate::queue::keys::Keys;
use crate::queue::message::{
    DlqRecord, FailureReason, InFlightRecord, Message, OperationState, RetryRecord,
};
use crate::store::{Guard, StoreError, Transport, WriteBatch};
use std::future::Future;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Message broker for a single transport
///
/// Cheap to share behind an `Arc`; all state lives in the transport so several
/// brokers (or processes) over the same store cooperate on the same streams.
///
/// # Example
///
/// ```rust
/// use lanequeue::queue::{Broker, BrokerConfig};
/// use lanequeue::store::MemoryTransport;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = Broker::new("default", Arc::new(MemoryTransport::new()), BrokerConfig::default())?;
///
/// let id = broker.publish("orders", json!({"order_id": 7})).await?;
/// let message = broker.get_next("orders", "billing").await?.expect("published above");
/// assert_eq!(message.identifier, id);
/// assert!(broker.ack("orders", &id, "billing").await?);
/// # Ok(())
/// # }
/// ```
pub struct Broker {
    name: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: BrokerConfig,
    pub(crate) clock: Arc<dyn TimeProvider>,
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("name", &self.name)
            .field("transport", &self.transport.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Outcome of one optimistic attempt against a group's cursor
#[derive(Debug)]
pub(crate) enum DeliveryError {
    Conflict,
    Failed(BrokerError),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Conflict => write!(f, "position changed concurrently"),
            DeliveryError::Failed(e) => write!(f, "{e}"),
        }
    }
}

impl From<BrokerError> for DeliveryError {
    fn from(error: BrokerError) -> Self {
        DeliveryError::Failed(error)
    }
}

impl From<StoreError> for DeliveryError {
    fn from(error: StoreError) -> Self {
        DeliveryError::Failed(error.into())
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(error: serde_json::Error) -> Self {
        DeliveryError::Failed(error.into())
    }
}

impl Broker {
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        config: BrokerConfig,
    ) -> BrokerResult<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            transport,
            config,
            clock: Arc::new(SystemTimeProvider),
        })
    }

    /// Replace the clock used for delivery, retry and timeout timestamps
    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn now(&self) -> f64 {
        self.clock.epoch_seconds()
    }

    pub(crate) fn group<'a>(&'a self, stream: &'a str, group: &'a str) -> ConsumerGroup<'a> {
        ConsumerGroup::new(self.transport.as_ref(), stream, group)
    }

    /// Append a new message to `stream` and return its identifier
    pub async fn publish(&self, stream: &str, payload: Value) -> BrokerResult<String> {
        let message = Message::new(payload);
        let encoded = serde_json::to_string(&message)?;

        let length = self
            .transport
            .list_push(&Keys::stream(stream), &encoded)
            .await?;
        self.transport
            .apply(WriteBatch::new().set_add(Keys::STREAMS, stream))
            .await?;

        log::trace!(
            "Published {} to '{}' (length {})",
            message.identifier,
            stream,
            length
        );
        Ok(message.identifier)
    }

    /// Create the group's cursor at the start of the stream if it does not exist yet
    pub async fn ensure_group(&self, stream: &str, group: &str) -> BrokerResult<()> {
        self.group(stream, group).ensure().await
    }

    /// Deliver the next message for `group`, or `None` when the group has caught up
    ///
    /// Before reading, stale deliveries are reclaimed and retries whose delay has
    /// elapsed are spliced back in at the group's cursor. The cursor advance is a
    /// compare-and-apply; lost races are retried with jittered backoff.
    pub async fn get_next(&self, stream: &str, group: &str) -> BrokerResult<Option<Message>> {
        self.contended("get_next", stream, group, || self.try_deliver(stream, group))
            .await
    }

    /// Run `attempt` until it stops losing compare-and-apply races on `group`'s cursor
    pub(crate) async fn contended<T, F, Fut>(
        &self,
        operation: &str,
        stream: &str,
        group: &str,
        attempt: F,
    ) -> BrokerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DeliveryError>>,
    {
        let policy = RetryPolicy::contention(
            self.config.cas_max_attempts,
            Duration::from_millis(self.config.cas_base_delay_ms),
        );
        let attempts = policy.max_attempts;

        let result = retry_async_if(
            operation,
            policy,
            |e: &DeliveryError| matches!(e, DeliveryError::Conflict),
            attempt,
        )
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(DeliveryError::Failed(e)) => Err(e),
            Err(DeliveryError::Conflict) => {
                log::warn!(
                    "Giving up {} on '{}' for group '{}' after {} conflicting cursor updates",
                    operation,
                    stream,
                    group,
                    attempts
                );
                Err(BrokerError::Contention {
                    stream: stream.to_string(),
                    group: group.to_string(),
                    attempts,
                })
            }
        }
    }

    async fn try_deliver(&self, stream: &str, group: &str) -> Result<Option<Message>, DeliveryError> {
        self.group(stream, group).ensure().await?;
        self.reclaim_stale(stream, group).await?;
        if self.requeue_ready_retries(stream, group).await?.is_none() {
            return Err(DeliveryError::Conflict);
        }

        let position_key = Keys::position(stream, group);
        let generation_key = Keys::generation(stream, group);
        let observed = self.transport.get(&position_key).await?;
        let generation = self.transport.get(&generation_key).await?;
        let position = parse_position(&position_key, observed.as_deref())?;

        let stream_key = Keys::stream(stream);
        let Some(raw) = self.transport.list_index(&stream_key, position).await? else {
            return Ok(None);
        };
        let message: Message =
            serde_json::from_str(&raw).map_err(|e| BrokerError::corrupt(&stream_key, e))?;

        let record = InFlightRecord {
            identifier: message.identifier.clone(),
            payload: message.payload.clone(),
            delivered_at: self.now(),
        };
        let ownership_key = Keys::ownership(&message.identifier);
        let batch = WriteBatch::new()
            .set(&position_key, (position + 1).to_string())
            .set_add(&ownership_key, Keys::ownership_tag(stream, group))
            .expire(&ownership_key, self.config.ownership_ttl())
            .set_with_ttl(
                Keys::op_state(group, &message.identifier),
                OperationState::Delivered.to_string(),
                self.config.operation_state_ttl(),
            )
            .hash_set(
                Keys::in_flight(stream, group),
                &message.identifier,
                serde_json::to_string(&record)?,
            );

        // A splice into this group's stream bumps the generation, so a read that
        // raced one would otherwise step over the spliced message
        let guards = [
            Guard::new(&position_key, observed.as_deref()),
            Guard::new(&generation_key, generation.as_deref()),
        ];
        if !self.transport.compare_and_apply(&guards, batch).await? {
            return Err(DeliveryError::Conflict);
        }

        log::debug!(
            "Delivered {} from '{}' to group '{}' at position {}",
            message.identifier,
            stream,
            group,
            position
        );
        Ok(Some(message))
    }

    /// Deliver up to `count` messages, stopping at the first empty read
    pub async fn read(&self, stream: &str, group: &str, count: usize) -> BrokerResult<Vec<Message>> {
        let mut messages = Vec::with_capacity(count.min(64));
        while messages.len() < count {
            match self.get_next(stream, group).await? {
                Some(message) => messages.push(message),
                None => break,
            }
        }
        Ok(messages)
    }

    /// Like [`read`](Self::read) but waits up to `timeout` for messages to arrive
    ///
    /// A zero timeout never suspends.
    pub async fn read_blocking(
        &self,
        stream: &str,
        group: &str,
        count: usize,
        timeout: Duration,
    ) -> BrokerResult<Vec<Message>> {
        let messages = self.read(stream, group, count).await?;
        if !messages.is_empty() || timeout.is_zero() {
            return Ok(messages);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let interval = self.config.blocking_poll_interval();
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(interval.min(deadline - now)).await;

            let messages = self.read(stream, group, count).await?;
            if !messages.is_empty() {
                return Ok(messages);
            }
        }
    }

    /// Acknowledge successful processing
    ///
    /// Returns `false` when `group` does not own the delivery or has already nacked
    /// it; a pending retry is redelivered and acked then. Repeating an ack while the
    /// ACKED marker is alive returns `true` without touching anything.
    pub async fn ack(&self, stream: &str, identifier: &str, group: &str) -> BrokerResult<bool> {
        match self.operation_state(group, identifier).await? {
            Some(OperationState::Acked) => {
                log::debug!("Duplicate ack for {identifier} in group '{group}'");
                return Ok(true);
            }
            Some(OperationState::Retrying) => {
                log::warn!(
                    "Rejected ack for {} on '{}': group '{}' already nacked it",
                    identifier,
                    stream,
                    group
                );
                return Ok(false);
            }
            _ => {}
        }
        if !self.owns(stream, group, identifier).await? {
            log::warn!(
                "Rejected ack for {} on '{}': not owned by group '{}'",
                identifier,
                stream,
                group
            );
            return Ok(false);
        }

        let batch = self
            .release(stream, group, identifier)
            .set_with_ttl(
                Keys::op_state(group, identifier),
                OperationState::Acked.to_string(),
                self.config.operation_state_ttl(),
            );
        self.transport.apply(batch).await?;

        log::debug!("Acked {identifier} on '{stream}' for group '{group}'");
        Ok(true)
    }

    /// Report a processing failure; the message is retried later or dead-lettered
    ///
    /// Returns `false` when `group` does not own the delivery or it was already acked.
    pub async fn nack(&self, stream: &str, identifier: &str, group: &str) -> BrokerResult<bool> {
        match self.operation_state(group, identifier).await? {
            Some(OperationState::Retrying) | Some(OperationState::Dlq) => {
                log::debug!("Duplicate nack for {identifier} in group '{group}'");
                return Ok(true);
            }
            Some(OperationState::Acked) => {
                log::warn!("Rejected nack for {identifier}: already acked by group '{group}'");
                return Ok(false);
            }
            _ => {}
        }
        if !self.owns(stream, group, identifier).await? {
            log::warn!(
                "Rejected nack for {} on '{}': not owned by group '{}'",
                identifier,
                stream,
                group
            );
            return Ok(false);
        }

        let state = self.group(stream, group);
        let Some(record) = state.in_flight_record(identifier).await? else {
            log::warn!("Rejected nack for {identifier}: no in-flight delivery for group '{group}'");
            return Ok(false);
        };

        let retry_count = state.retry_count(identifier).await?;
        let now = self.now();

        if retry_count < self.config.max_retries {
            let retry_count = retry_count + 1;
            let retry = RetryRecord {
                identifier: record.identifier,
                payload: record.payload,
                retry_count,
                next_retry_time: now + self.config.retry_backoff_seconds(retry_count),
            };
            let batch = WriteBatch::new()
                .hash_delete(Keys::in_flight(stream, group), identifier)
                .hash_set(
                    Keys::retry_count(stream, group),
                    identifier,
                    retry_count.to_string(),
                )
                .hash_set(
                    Keys::failed(stream, group),
                    identifier,
                    serde_json::to_string(&retry)?,
                )
                .set_with_ttl(
                    Keys::op_state(group, identifier),
                    OperationState::Retrying.to_string(),
                    self.config.operation_state_ttl(),
                );
            self.transport.apply(batch).await?;

            log::info!(
                "Scheduled retry {}/{} for {} on '{}' (group '{}')",
                retry_count,
                self.config.max_retries,
                identifier,
                stream,
                group
            );
            return Ok(true);
        }

        let batch = self.dead_letter(
            stream,
            group,
            DlqRecord {
                identifier: record.identifier,
                payload: record.payload,
                failure_reason: FailureReason::MaxRetriesExceeded,
                timestamp: now,
            },
        )?;
        self.transport.apply(batch).await?;
        Ok(true)
    }

    /// Last settlement recorded for `identifier` in `group`, while its marker is alive
    pub async fn operation_state(
        &self,
        group: &str,
        identifier: &str,
    ) -> BrokerResult<Option<OperationState>> {
        let raw = self
            .transport
            .get(&Keys::op_state(group, identifier))
            .await?;
        Ok(raw.and_then(|value| OperationState::from_str(&value).ok()))
    }

    async fn owns(&self, stream: &str, group: &str, identifier: &str) -> BrokerResult<bool> {
        Ok(self
            .transport
            .set_contains(
                &Keys::ownership(identifier),
                &Keys::ownership_tag(stream, group),
            )
            .await?)
    }

    /// Writes that drop the delivery: in-flight entry, ownership tag and retry count
    fn release(&self, stream: &str, group: &str, identifier: &str) -> WriteBatch {
        WriteBatch::new()
            .hash_delete(Keys::in_flight(stream, group), identifier)
            .hash_delete(Keys::retry_count(stream, group), identifier)
            .set_remove(
                Keys::ownership(identifier),
                Keys::ownership_tag(stream, group),
            )
    }

    /// Writes that end a delivery in the dead-letter table (or drop it when disabled)
    pub(crate) fn dead_letter(
        &self,
        stream: &str,
        group: &str,
        record: DlqRecord,
    ) -> BrokerResult<WriteBatch> {
        let identifier = record.identifier.clone();
        let mut batch = self.release(stream, group, &identifier).set_with_ttl(
            Keys::op_state(group, &identifier),
            OperationState::Dlq.to_string(),
            self.config.operation_state_ttl(),
        );

        if self.config.enable_dlq {
            log::warn!(
                "Dead-lettering {} on '{}' for group '{}': {}",
                identifier,
                stream,
                group,
                record.failure_reason
            );
            batch = batch.hash_set(
                Keys::dlq(stream, group),
                &identifier,
                serde_json::to_string(&record)?,
            );
        } else {
            log::warn!(
                "Dropping {} on '{}' for group '{}' ({}); dead-letter queue disabled",
                identifier,
                stream,
                group,
                record.failure_reason
            );
        }
        Ok(batch)
    }

    /// Remove every stream, group and delivery record
    pub async fn reset(&self) -> BrokerResult<()> {
        self.transport.flush().await?;
        log::info!("Broker '{}' reset", self.name);
        Ok(())
    }
}
