//! Per (stream, group) bookkeeping
//!
//! A group is just a cursor plus a handful of hashes keyed by message identifier. It is
//! created lazily the first time anyone reads through it and never reset afterwards.

use crate::queue::error::{BrokerError, BrokerResult};
use crate::queue::keys::Keys;
use crate::queue::message::{DlqRecord, InFlightRecord, RetryRecord};
use crate::store::{Transport, WriteBatch};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Counters for one consumer group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    pub name: String,
    pub position: u64,
    /// Messages appended but not yet delivered to this group
    pub lag: u64,
    pub in_flight: u64,
    pub failed: u64,
    pub dlq: u64,
}

pub(crate) struct ConsumerGroup<'a> {
    transport: &'a dyn Transport,
    stream: &'a str,
    name: &'a str,
}

impl<'a> ConsumerGroup<'a> {
    pub fn new(transport: &'a dyn Transport, stream: &'a str, name: &'a str) -> Self {
        Self {
            transport,
            stream,
            name,
        }
    }

    /// Create the cursor at 0 if missing and register the stream and group names
    pub async fn ensure(&self) -> BrokerResult<()> {
        let created = self
            .transport
            .set_if_absent(&Keys::position(self.stream, self.name), "0")
            .await?;
        if created {
            log::debug!(
                "Created consumer group '{}' on stream '{}'",
                self.name,
                self.stream
            );
        }

        self.transport
            .apply(
                WriteBatch::new()
                    .set_add(Keys::groups(self.stream), self.name)
                    .set_add(Keys::STREAMS, self.stream),
            )
            .await?;
        Ok(())
    }

    pub async fn position(&self) -> BrokerResult<u64> {
        let key = Keys::position(self.stream, self.name);
        let raw = self.transport.get(&key).await?;
        parse_position(&key, raw.as_deref())
    }

    pub async fn in_flight_records(&self) -> BrokerResult<Vec<InFlightRecord>> {
        self.records(&Keys::in_flight(self.stream, self.name)).await
    }

    pub async fn in_flight_record(&self, identifier: &str) -> BrokerResult<Option<InFlightRecord>> {
        self.record(&Keys::in_flight(self.stream, self.name), identifier)
            .await
    }

    pub async fn retry_records(&self) -> BrokerResult<Vec<RetryRecord>> {
        self.records(&Keys::failed(self.stream, self.name)).await
    }

    pub async fn dlq_records(&self) -> BrokerResult<Vec<DlqRecord>> {
        self.records(&Keys::dlq(self.stream, self.name)).await
    }

    pub async fn dlq_record(&self, identifier: &str) -> BrokerResult<Option<DlqRecord>> {
        self.record(&Keys::dlq(self.stream, self.name), identifier)
            .await
    }

    /// Nacks recorded so far for `identifier` (0 when never nacked)
    pub async fn retry_count(&self, identifier: &str) -> BrokerResult<u32> {
        let key = Keys::retry_count(self.stream, self.name);
        match self.transport.hash_get(&key, identifier).await? {
            Some(raw) => raw.parse().map_err(|_| BrokerError::InvalidCounter {
                key: key.clone(),
                value: raw.clone(),
            }),
            None => Ok(0),
        }
    }

    pub async fn stats(&self) -> BrokerResult<GroupStats> {
        let position = self.position().await?;
        let length = self.transport.list_len(&Keys::stream(self.stream)).await?;

        Ok(GroupStats {
            name: self.name.to_string(),
            position,
            lag: length.saturating_sub(position),
            in_flight: self
                .transport
                .hash_len(&Keys::in_flight(self.stream, self.name))
                .await?,
            failed: self
                .transport
                .hash_len(&Keys::failed(self.stream, self.name))
                .await?,
            dlq: self
                .transport
                .hash_len(&Keys::dlq(self.stream, self.name))
                .await?,
        })
    }

    async fn records<T: DeserializeOwned>(&self, key: &str) -> BrokerResult<Vec<T>> {
        self.transport
            .hash_get_all(key)
            .await?
            .values()
            .map(|raw| serde_json::from_str(raw).map_err(|e| BrokerError::corrupt(key, e)))
            .collect()
    }

    async fn record<T: DeserializeOwned>(&self, key: &str, field: &str) -> BrokerResult<Option<T>> {
        self.transport
            .hash_get(key, field)
            .await?
            .map(|raw| serde_json::from_str(&raw).map_err(|e| BrokerError::corrupt(key, e)))
            .transpose()
    }
}

pub(crate) fn parse_position(key: &str, raw: Option<&str>) -> BrokerResult<u64> {
    match raw {
        Some(value) => value.parse().map_err(|_| BrokerError::InvalidCounter {
            key: key.to_string(),
            value: value.to_string(),
        }),
        None => Ok(0),
    }
}
