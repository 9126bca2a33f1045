//! Test modules for stream consumers
//!
//! Lane selection is tested against a recording fake broker; settlement semantics
//! against the real engine on an in-memory transport.


use crate::consumer::{BatchHandler, BrokerPort, HandlerError};
use crate::queue::{BrokerError, BrokerResult, Message, OperationState};
use crate::store::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Ensure(String),
    Read(String, Duration),
    Ack(String, String),
    Nack(String, String),
    Publish(String, Value),
}

/// Broker port that serves canned messages and records every call
#[derive(Default)]
pub(crate) struct FakeBroker {
    streams: Mutex<HashMap<String, VecDeque<Message>>>,
    failing_reads: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBroker {
    pub fn push(&self, stream: &str, payload: Value) -> String {
        let message = Message::new(payload);
        let id = message.identifier.clone();
        self.streams
            .lock()
            .unwrap()
            .entry(stream.to_string())
            .or_default()
            .push_back(message);
        id
    }

    pub fn fail_reads(&self, stream: &str) {
        self.failing_reads.lock().unwrap().insert(stream.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reads_of(&self, stream: &str) -> Vec<Duration> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Read(s, timeout) if s == stream => Some(timeout),
                _ => None,
            })
            .collect()
    }

    pub fn published(&self) -> Vec<(String, Value)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Publish(stream, payload) => Some((stream, payload)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BrokerPort for FakeBroker {
    async fn publish(&self, stream: &str, payload: Value) -> BrokerResult<String> {
        self.record(Call::Publish(stream.to_string(), payload.clone()));
        Ok(self.push(stream, payload))
    }

    async fn ensure_group(&self, stream: &str, _group: &str) -> BrokerResult<()> {
        self.record(Call::Ensure(stream.to_string()));
        Ok(())
    }

    async fn read_blocking(
        &self,
        stream: &str,
        _group: &str,
        count: usize,
        timeout: Duration,
    ) -> BrokerResult<Vec<Message>> {
        self.record(Call::Read(stream.to_string(), timeout));
        if self.failing_reads.lock().unwrap().contains(stream) {
            return Err(BrokerError::Store(StoreError::Unavailable {
                message: "connection reset".to_string(),
            }));
        }
        let mut streams = self.streams.lock().unwrap();
        let queue = streams.entry(stream.to_string()).or_default();
        let take = count.min(queue.len());
        Ok(queue.drain(..take).collect())
    }

    async fn ack(&self, stream: &str, identifier: &str, _group: &str) -> BrokerResult<bool> {
        self.record(Call::Ack(stream.to_string(), identifier.to_string()));
        Ok(true)
    }

    async fn nack(&self, stream: &str, identifier: &str, _group: &str) -> BrokerResult<bool> {
        self.record(Call::Nack(stream.to_string(), identifier.to_string()));
        Ok(true)
    }

    async fn operation_state(
        &self,
        _group: &str,
        _identifier: &str,
    ) -> BrokerResult<Option<OperationState>> {
        Ok(Some(OperationState::Retrying))
    }
}

/// Handler that fails on payloads containing `"fail": true` and records what it saw
#[derive(Default)]
pub(crate) struct ScriptedHandler {
    seen: Mutex<Vec<(String, Value)>>,
}

impl ScriptedHandler {
    pub fn seen(&self) -> Vec<(String, Value)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchHandler for ScriptedHandler {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn handle(&self, stream: &str, message: &Message) -> Result<(), HandlerError> {
        self.seen
            .lock()
            .unwrap()
            .push((stream.to_string(), message.payload.clone()));
        if message.payload["fail"] == Value::Bool(true) {
            return Err(HandlerError::failed("scripted failure"));
        }
        Ok(())
    }
}
