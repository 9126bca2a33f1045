//! Redelivery: stale reclamation, retry requeue and dead-letter reprocessing
//!
//! Nothing here runs in the background. Every `get_next` reclaims and requeues for
//! its own group first, so recovery happens as long as somebody is reading.

use crate::queue::broker::{Broker, DeliveryError};
use crate::queue::error::BrokerResult;
use crate::queue::group::parse_position;
use crate::queue::keys::Keys;
use crate::queue::message::{DlqRecord, FailureReason, Message, RetryRecord};
use crate::store::{Guard, WriteBatch};

impl Broker {
    /// Move deliveries older than `message_timeout` straight to the dead-letter table
    ///
    /// Timed-out deliveries bypass the retry budget. Returns how many were reclaimed.
    pub(crate) async fn reclaim_stale(&self, stream: &str, group: &str) -> BrokerResult<usize> {
        let now = self.now();
        let stale: Vec<_> = self
            .group(stream, group)
            .in_flight_records()
            .await?
            .into_iter()
            .filter(|record| now - record.delivered_at > self.config.message_timeout)
            .collect();

        for record in &stale {
            let batch = self.dead_letter(
                stream,
                group,
                DlqRecord {
                    identifier: record.identifier.clone(),
                    payload: record.payload.clone(),
                    failure_reason: FailureReason::Timeout,
                    timestamp: now,
                },
            )?;
            self.transport.apply(batch).await?;
        }

        if !stale.is_empty() {
            log::info!(
                "Reclaimed {} stale deliveries on '{}' for group '{}'",
                stale.len(),
                stream,
                group
            );
        }
        Ok(stale.len())
    }

    /// Splice retries whose delay has elapsed back in at the group's cursor
    ///
    /// The retry records are claimed in the same guarded write as the splice. Returns
    /// `None` when a cursor moved underneath it; nothing was written and the caller
    /// should start over.
    pub(crate) async fn requeue_ready_retries(
        &self,
        stream: &str,
        group: &str,
    ) -> BrokerResult<Option<usize>> {
        let now = self.now();
        let mut ready: Vec<RetryRecord> = self
            .group(stream, group)
            .retry_records()
            .await?
            .into_iter()
            .filter(|record| record.next_retry_time <= now)
            .collect();
        if ready.is_empty() {
            return Ok(Some(0));
        }
        ready.sort_by(|a, b| {
            a.next_retry_time
                .total_cmp(&b.next_retry_time)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });

        let failed_key = Keys::failed(stream, group);
        let claim = ready.iter().fold(WriteBatch::new(), |batch, record| {
            batch.hash_delete(&failed_key, &record.identifier)
        });
        let messages: Vec<Message> = ready
            .into_iter()
            .map(|record| Message::with_identifier(record.identifier, record.payload))
            .collect();
        if !self
            .splice_at_group_position(stream, group, claim, &messages)
            .await?
        {
            log::debug!("Requeue on '{stream}' for group '{group}' raced a cursor update");
            return Ok(None);
        }

        log::debug!(
            "Requeued {} retries on '{}' for group '{}'",
            messages.len(),
            stream,
            group
        );
        Ok(Some(messages.len()))
    }

    /// Insert `messages` at `group`'s cursor so it reads them next
    ///
    /// `claim` is applied in the same write. Every other group whose cursor is at or
    /// past the insertion point is advanced by the number of inserted messages, so it
    /// neither sees them nor re-reads anything it already consumed. The write is
    /// guarded on every cursor read here plus `group`'s splice generation; returns
    /// `false` without writing when any of them changed.
    pub(crate) async fn splice_at_group_position(
        &self,
        stream: &str,
        group: &str,
        claim: WriteBatch,
        messages: &[Message],
    ) -> BrokerResult<bool> {
        if messages.is_empty() {
            return Ok(true);
        }

        let position_key = Keys::position(stream, group);
        let generation_key = Keys::generation(stream, group);
        let observed = self.transport.get(&position_key).await?;
        let generation = self.transport.get(&generation_key).await?;
        let position = parse_position(&position_key, observed.as_deref())?;

        let encoded = messages
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        let inserted = encoded.len() as i64;

        let mut guards = vec![
            Guard::new(&position_key, observed.as_deref()),
            Guard::new(&generation_key, generation.as_deref()),
        ];
        let mut batch = claim
            .list_insert(Keys::stream(stream), position, encoded)
            .incr_by(&generation_key, 1);

        for other in self.transport.set_members(&Keys::groups(stream)).await? {
            if other == group {
                continue;
            }
            let other_key = Keys::position(stream, &other);
            let other_observed = self.transport.get(&other_key).await?;
            if parse_position(&other_key, other_observed.as_deref())? >= position {
                batch = batch.incr_by(&other_key, inserted);
            }
            guards.push(Guard::new(other_key, other_observed.as_deref()));
        }

        Ok(self.transport.compare_and_apply(&guards, batch).await?)
    }

    /// Dead-lettered messages for `group`, oldest first
    pub async fn dlq_messages(&self, stream: &str, group: &str) -> BrokerResult<Vec<DlqRecord>> {
        let mut records = self.group(stream, group).dlq_records().await?;
        records.sort_by(|a, b| {
            a.timestamp
                .total_cmp(&b.timestamp)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        Ok(records)
    }

    /// Put a dead-lettered message back in front of `group` with a fresh retry budget
    ///
    /// Returns `false` when there is no such entry in the group's dead-letter table.
    pub async fn reprocess(&self, stream: &str, group: &str, identifier: &str) -> BrokerResult<bool> {
        let reprocessed = self
            .contended("reprocess", stream, group, || {
                self.try_reprocess(stream, group, identifier)
            })
            .await?;
        if reprocessed {
            log::info!("Reprocessing {identifier} on '{stream}' for group '{group}'");
        } else {
            log::warn!("No dead-lettered message {identifier} on '{stream}' for group '{group}'");
        }
        Ok(reprocessed)
    }

    async fn try_reprocess(
        &self,
        stream: &str,
        group: &str,
        identifier: &str,
    ) -> Result<bool, DeliveryError> {
        let Some(record) = self.group(stream, group).dlq_record(identifier).await? else {
            return Ok(false);
        };

        let claim = WriteBatch::new()
            .hash_delete(Keys::dlq(stream, group), identifier)
            .hash_delete(Keys::retry_count(stream, group), identifier)
            .delete(Keys::op_state(group, identifier));
        if !self
            .splice_at_group_position(stream, group, claim, &[record.into_message()])
            .await?
        {
            return Err(DeliveryError::Conflict);
        }
        Ok(true)
    }
}
