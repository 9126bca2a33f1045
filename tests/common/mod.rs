//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use lanequeue::consumer::{BatchHandler, HandlerError};
use lanequeue::core::time::TimeProvider;
use lanequeue::queue::{Broker, BrokerConfig, Message};
use lanequeue::store::MemoryTransport;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// Clock that only moves when told to
#[derive(Clone)]
pub struct ManualClock {
    base_instant: Instant,
    base_system: SystemTime,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base_instant: Instant::now(),
            base_system: SystemTime::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl TimeProvider for ManualClock {
    fn now(&self) -> Instant {
        self.base_instant + *self.offset.lock().unwrap()
    }

    fn system_time(&self) -> SystemTime {
        self.base_system + *self.offset.lock().unwrap()
    }
}

pub fn memory_broker(config: BrokerConfig) -> Broker {
    Broker::new("test", Arc::new(MemoryTransport::new()), config).unwrap()
}

pub fn clocked_broker(config: BrokerConfig) -> (Broker, ManualClock) {
    let clock = ManualClock::new();
    let broker = memory_broker(config).with_clock(Arc::new(clock.clone()));
    (broker, clock)
}

/// Records `(lane, payload)` for every message; fails payloads with `"fail": true`
#[derive(Default)]
pub struct RecordingHandler {
    seen: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingHandler {
    pub fn seen(&self) -> Vec<(String, serde_json::Value)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchHandler for RecordingHandler {
    fn name(&self) -> &str {
        "recording"
    }

    async fn handle(&self, stream: &str, message: &Message) -> Result<(), HandlerError> {
        self.seen
            .lock()
            .unwrap()
            .push((stream.to_string(), message.payload.clone()));
        if message.payload["fail"] == serde_json::json!(true) {
            return Err(HandlerError::failed("asked to fail"));
        }
        Ok(())
    }
}
