//! StreamConsumer - polling loop with primary/backfill priority lanes
//!
//! With lanes enabled the consumer reads two streams: the primary stream without
//! waiting, and `<primary>:<suffix>` (the backfill lane) only when the primary is
//! empty. Backfill reads block for at most [`BACKFILL_TIMEOUT_CAP_MS`] so new
//! primary traffic is picked up quickly. Acks, nacks and dead-letter entries always
//! go to the lane the current batch came from.
//!
//! [`BACKFILL_TIMEOUT_CAP_MS`]: crate::consumer::config::BACKFILL_TIMEOUT_CAP_MS

use crate::consumer::config::{dlq_stream, ConsumerConfig};
use crate::consumer::error::{ConsumerResult, HandlerError};
use crate::consumer::handler::BatchHandler;
use crate::consumer::port::BrokerPort;
use crate::queue::{Message, OperationState};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Counts for one dispatched batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub failed: usize,
}

/// Most message identifiers whose handler failures are tracked at once
const MAX_TRACKED_FAILURES: usize = 10_000;

/// Handler failures for one message since its last success
#[derive(Debug, Clone, Copy)]
struct FailureCount {
    count: u32,
    last_failed: Instant,
}

/// Result of one [`StreamConsumer::poll_once`] iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing to read on any lane
    Idle,
    Primary(BatchOutcome),
    Backfill(BatchOutcome),
    /// The read that would have produced a batch failed
    ReadFailed,
    /// A batch was read but acking, nacking or dead-lettering it failed
    DispatchFailed,
}

impl PollOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PollOutcome::ReadFailed | PollOutcome::DispatchFailed)
    }
}

pub struct StreamConsumer {
    broker: Arc<dyn BrokerPort>,
    handler: Arc<dyn BatchHandler>,
    stream: String,
    group: String,
    consumer_name: String,
    config: ConsumerConfig,
    backfill_stream: Option<String>,
    active_stream: String,
    /// Messages that failed and may still be redelivered to this consumer
    failures: HashMap<String, FailureCount>,
    failure_capacity: usize,
}

impl std::fmt::Debug for StreamConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConsumer")
            .field("stream", &self.stream)
            .field("group", &self.group)
            .field("consumer", &self.consumer_name)
            .field("handler", &self.handler.name())
            .field("active_stream", &self.active_stream)
            .finish()
    }
}

impl StreamConsumer {
    pub fn new(
        broker: Arc<dyn BrokerPort>,
        handler: Arc<dyn BatchHandler>,
        stream: impl Into<String>,
        group: impl Into<String>,
        config: ConsumerConfig,
    ) -> ConsumerResult<Self> {
        config.validate()?;
        let stream = stream.into();
        let backfill_stream = config
            .priority_lanes
            .enabled
            .then(|| config.backfill_stream(&stream));
        let consumer_name = format!("{}-{}", handler.name(), &Uuid::new_v4().simple().to_string()[..8]);

        Ok(Self {
            broker,
            handler,
            active_stream: stream.clone(),
            stream,
            group: group.into(),
            consumer_name,
            config,
            backfill_stream,
            failures: HashMap::new(),
            failure_capacity: MAX_TRACKED_FAILURES,
        })
    }

    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = name.into();
        self
    }

    #[cfg(test)]
    pub(crate) fn with_failure_capacity(mut self, capacity: usize) -> Self {
        self.failure_capacity = capacity.max(1);
        self
    }

    /// Messages whose failure count is currently held
    pub fn tracked_failures(&self) -> usize {
        self.failures.len()
    }

    pub fn primary_stream(&self) -> &str {
        &self.stream
    }

    pub fn backfill_stream(&self) -> Option<&str> {
        self.backfill_stream.as_deref()
    }

    /// Lane that produced the batch being (or last) processed
    pub fn active_stream(&self) -> &str {
        &self.active_stream
    }

    pub fn lanes_enabled(&self) -> bool {
        self.backfill_stream.is_some()
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Create the consumer group on every lane
    pub async fn initialize(&self) -> ConsumerResult<()> {
        self.broker.ensure_group(&self.stream, &self.group).await?;
        if let Some(backfill) = &self.backfill_stream {
            self.broker.ensure_group(backfill, &self.group).await?;
        }
        log::info!(
            "Consumer {} ready on '{}'{} (group '{}')",
            self.consumer_name,
            self.stream,
            self.backfill_stream
                .as_deref()
                .map(|b| format!(" with backfill '{b}'"))
                .unwrap_or_default(),
            self.group
        );
        Ok(())
    }

    /// Poll until `shutdown` fires
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> ConsumerResult<()> {
        self.initialize().await?;
        let idle_backoff = self.config.idle_backoff();

        loop {
            let outcome = tokio::select! {
                _ = shutdown.recv() => break,
                outcome = self.poll_once() => outcome,
            };

            let spin = outcome == PollOutcome::Idle && self.config.blocking_timeout_ms == 0;
            if outcome.is_failure() || spin {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(idle_backoff) => {}
                }
            }
        }

        log::info!("Consumer {} on '{}' stopped", self.consumer_name, self.stream);
        Ok(())
    }

    /// One polling iteration
    pub async fn poll_once(&mut self) -> PollOutcome {
        if self.lanes_enabled() {
            self.poll_lanes().await
        } else {
            self.poll_primary_only().await
        }
    }

    async fn poll_primary_only(&mut self) -> PollOutcome {
        let primary = self.stream.clone();
        let batch = match self.read(&primary, self.config.blocking_timeout()).await {
            Some(batch) => batch,
            None => return PollOutcome::ReadFailed,
        };
        if batch.is_empty() {
            return PollOutcome::Idle;
        }

        self.active_stream = primary;
        match self.dispatch(batch).await {
            Ok(outcome) => PollOutcome::Primary(outcome),
            Err(e) => {
                log::error!("Consumer {} failed to settle batch: {}", self.consumer_name, e);
                PollOutcome::DispatchFailed
            }
        }
    }

    async fn poll_lanes(&mut self) -> PollOutcome {
        let primary = self.stream.clone();
        if let Some(batch) = self.read(&primary, Duration::ZERO).await {
            if !batch.is_empty() {
                self.active_stream = primary;
                return match self.dispatch(batch).await {
                    Ok(outcome) => PollOutcome::Primary(outcome),
                    Err(e) => {
                        log::error!("Consumer {} failed to settle batch: {}", self.consumer_name, e);
                        PollOutcome::DispatchFailed
                    }
                };
            }
        }

        let Some(backfill) = self.backfill_stream.clone() else {
            return PollOutcome::Idle;
        };
        let batch = match self.read(&backfill, self.config.backfill_timeout()).await {
            Some(batch) => batch,
            None => return PollOutcome::ReadFailed,
        };
        if batch.is_empty() {
            return PollOutcome::Idle;
        }

        self.active_stream = backfill;
        let result = self.dispatch(batch).await;
        match result {
            Ok(outcome) => {
                if outcome.failed > 0 {
                    self.active_stream = primary;
                }
                PollOutcome::Backfill(outcome)
            }
            Err(e) => {
                log::error!(
                    "Consumer {} failed to settle backfill batch: {}",
                    self.consumer_name,
                    e
                );
                self.active_stream = primary;
                PollOutcome::DispatchFailed
            }
        }
    }

    /// Read a batch; `None` when the read itself failed (already logged)
    async fn read(&self, stream: &str, timeout: Duration) -> Option<Vec<Message>> {
        match self
            .broker
            .read_blocking(stream, &self.group, self.config.batch_size, timeout)
            .await
        {
            Ok(batch) => Some(batch),
            Err(e) => {
                log::error!(
                    "Consumer {} failed to read '{}': {}",
                    self.consumer_name,
                    stream,
                    e
                );
                None
            }
        }
    }

    /// Hand every message to the handler and settle it on the active lane
    pub async fn dispatch(&mut self, batch: Vec<Message>) -> ConsumerResult<BatchOutcome> {
        let lane = self.active_stream.clone();
        let mut outcome = BatchOutcome::default();

        for message in batch {
            match self.handler.handle(&lane, &message).await {
                Ok(()) => {
                    self.failures.remove(&message.identifier);
                    if !self.broker.ack(&lane, &message.identifier, &self.group).await? {
                        log::warn!(
                            "Ack for {} on '{}' was rejected; delivery no longer owned",
                            message.identifier,
                            lane
                        );
                    }
                    outcome.processed += 1;
                }
                Err(error) => {
                    outcome.failed += 1;
                    self.handle_failure(&lane, message, error).await?;
                }
            }
        }
        Ok(outcome)
    }

    async fn handle_failure(
        &mut self,
        lane: &str,
        message: Message,
        error: HandlerError,
    ) -> ConsumerResult<()> {
        let failures = self.record_failure(&message.identifier);

        if failures <= self.config.max_retries {
            log::warn!(
                "Handler '{}' failed on {} ({}/{}): {}",
                self.handler.name(),
                message.identifier,
                failures,
                self.config.max_retries,
                error
            );
            if !self
                .broker
                .nack(lane, &message.identifier, &self.group)
                .await?
            {
                log::warn!(
                    "Nack for {} on '{}' was rejected; delivery no longer owned",
                    message.identifier,
                    lane
                );
                self.failures.remove(&message.identifier);
            } else if self
                .broker
                .operation_state(&self.group, &message.identifier)
                .await?
                == Some(OperationState::Dlq)
            {
                // the engine's own retry budget ran out first; it will not come back
                log::debug!(
                    "{} on '{}' was dead-lettered by the broker",
                    message.identifier,
                    lane
                );
                self.failures.remove(&message.identifier);
            }
            return Ok(());
        }

        self.failures.remove(&message.identifier);
        if self.config.enable_dlq {
            self.move_to_dlq(lane, &message, failures, &error).await?;
        } else {
            log::error!(
                "Dropping {} from '{}' after {} failures: {}",
                message.identifier,
                lane,
                failures,
                error
            );
        }
        if !self.broker.ack(lane, &message.identifier, &self.group).await? {
            log::warn!(
                "Ack for {} on '{}' after {} failures was rejected; delivery no longer owned",
                message.identifier,
                lane,
                failures
            );
        }
        Ok(())
    }

    /// Count one more failure for `identifier`, evicting the stalest entry when full
    fn record_failure(&mut self, identifier: &str) -> u32 {
        let now = Instant::now();
        if !self.failures.contains_key(identifier) && self.failures.len() >= self.failure_capacity {
            let stalest = self
                .failures
                .iter()
                .min_by_key(|(_, failure)| failure.last_failed)
                .map(|(id, _)| id.clone());
            if let Some(id) = stalest {
                log::debug!("Forgetting failure count for {id}; tracking table is full");
                self.failures.remove(&id);
            }
        }

        let failure = self
            .failures
            .entry(identifier.to_string())
            .or_insert(FailureCount {
                count: 0,
                last_failed: now,
            });
        failure.count += 1;
        failure.last_failed = now;
        failure.count
    }

    /// Publish a dead-letter entry for `message` to `<lane>:dlq`
    pub async fn move_to_dlq(
        &self,
        lane: &str,
        message: &Message,
        retry_count: u32,
        error: &HandlerError,
    ) -> ConsumerResult<String> {
        let target = dlq_stream(lane);
        let entry = json!({
            "original_id": message.identifier,
            "original_stream": lane,
            "consumer_group": self.group,
            "consumer": self.consumer_name,
            "failed_at": chrono::Utc::now().to_rfc3339(),
            "retry_count": retry_count,
            "failure_reason": error.to_string(),
            "payload": message.payload,
        });

        let id = self.broker.publish(&target, entry).await?;
        log::error!(
            "Moved {} from '{}' to '{}' after {} failures: {}",
            message.identifier,
            lane,
            target,
            retry_count,
            error
        );
        Ok(id)
    }
}
