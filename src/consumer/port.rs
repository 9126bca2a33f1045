//! The broker surface a consumer needs

use crate::queue::{Broker, BrokerResult, Message, OperationState};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Broker operations used by [`StreamConsumer`](crate::consumer::StreamConsumer)
#[async_trait]
pub trait BrokerPort: Send + Sync {
    async fn publish(&self, stream: &str, payload: Value) -> BrokerResult<String>;

    async fn ensure_group(&self, stream: &str, group: &str) -> BrokerResult<()>;

    /// Read up to `count` messages, waiting at most `timeout` (zero never waits)
    async fn read_blocking(
        &self,
        stream: &str,
        group: &str,
        count: usize,
        timeout: Duration,
    ) -> BrokerResult<Vec<Message>>;

    async fn ack(&self, stream: &str, identifier: &str, group: &str) -> BrokerResult<bool>;

    async fn nack(&self, stream: &str, identifier: &str, group: &str) -> BrokerResult<bool>;

    async fn operation_state(
        &self,
        group: &str,
        identifier: &str,
    ) -> BrokerResult<Option<OperationState>>;
}

#[async_trait]
impl BrokerPort for Broker {
    async fn publish(&self, stream: &str, payload: Value) -> BrokerResult<String> {
        Broker::publish(self, stream, payload).await
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> BrokerResult<()> {
        Broker::ensure_group(self, stream, group).await
    }

    async fn read_blocking(
        &self,
        stream: &str,
        group: &str,
        count: usize,
        timeout: Duration,
    ) -> BrokerResult<Vec<Message>> {
        Broker::read_blocking(self, stream, group, count, timeout).await
    }

    async fn ack(&self, stream: &str, identifier: &str, group: &str) -> BrokerResult<bool> {
        Broker::ack(self, stream, identifier, group).await
    }

    async fn nack(&self, stream: &str, identifier: &str, group: &str) -> BrokerResult<bool> {
        Broker::nack(self, stream, identifier, group).await
    }

    async fn operation_state(
        &self,
        group: &str,
        identifier: &str,
    ) -> BrokerResult<Option<OperationState>> {
        Broker::operation_state(self, group, identifier).await
    }
}
