//! Health and introspection reports

use crate::queue::broker::Broker;
use crate::queue::config::BrokerConfig;
use crate::queue::error::BrokerResult;
use crate::queue::group::GroupStats;
use crate::queue::keys::Keys;
use crate::store::StoreStatus;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageCounts {
    /// Entries across all streams, including ones every group has consumed
    pub total: u64,
    pub in_flight: u64,
    pub failed: u64,
    pub dlq: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokerHealth {
    pub broker: String,
    pub transport: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message_counts: MessageCounts,
    pub streams: usize,
    pub consumer_groups: usize,
    pub configuration: BrokerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    pub name: String,
    pub length: u64,
    pub groups: Vec<GroupStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokerInfo {
    pub broker: String,
    pub transport: String,
    pub streams: Vec<StreamInfo>,
}

impl BrokerInfo {
    pub fn counts(&self) -> MessageCounts {
        let mut counts = MessageCounts::default();
        for stream in &self.streams {
            counts.total += stream.length;
            for group in &stream.groups {
                counts.in_flight += group.in_flight;
                counts.failed += group.failed;
                counts.dlq += group.dlq;
            }
        }
        counts
    }

    pub fn group_count(&self) -> usize {
        self.streams.iter().map(|s| s.groups.len()).sum()
    }
}

impl Broker {
    /// Per-stream lengths and per-group counters for every registered stream
    pub async fn info(&self) -> BrokerResult<BrokerInfo> {
        let mut streams = Vec::new();
        for name in self.transport.set_members(Keys::STREAMS).await? {
            let length = self.transport.list_len(&Keys::stream(&name)).await?;
            let mut groups = Vec::new();
            for group in self.transport.set_members(&Keys::groups(&name)).await? {
                groups.push(self.group(&name, &group).stats().await?);
            }
            streams.push(StreamInfo {
                name,
                length,
                groups,
            });
        }

        Ok(BrokerInfo {
            broker: self.name().to_string(),
            transport: self.transport.name().to_string(),
            streams,
        })
    }

    /// Snapshot of broker health; never fails, problems are reported in the result
    pub async fn health(&self) -> BrokerHealth {
        let mut health = BrokerHealth {
            broker: self.name().to_string(),
            transport: self.transport.name().to_string(),
            healthy: false,
            warning: None,
            error: None,
            message_counts: MessageCounts::default(),
            streams: 0,
            consumer_groups: 0,
            configuration: self.config.clone(),
        };

        match self.transport.status().await {
            Ok(StoreStatus::Ready) => {}
            Ok(StoreStatus::Loading { message }) => {
                health.warning = Some(format!("Store is still loading: {message}"));
                return health;
            }
            Ok(StoreStatus::Degraded { message }) => {
                health.error = Some(format!("Store is degraded: {message}"));
                return health;
            }
            Err(e) => {
                health.error = Some(e.to_string());
                return health;
            }
        }

        match self.info().await {
            Ok(info) => {
                health.message_counts = info.counts();
                health.streams = info.streams.len();
                health.consumer_groups = info.group_count();
                health.healthy = true;
            }
            Err(e) => {
                log::warn!("Health check for broker '{}' failed: {}", self.name(), e);
                health.error = Some(e.to_string());
            }
        }
        health
    }
}
