//! Test modules for the broker engine
//!
//! Tests are organised by functional area. Every test runs against an in-memory
//! transport driven by a mock clock so timeouts and retry delays are deterministic.


use crate::core::time::MockTimeProvider;
use crate::queue::{Broker, BrokerConfig};
use crate::store::MemoryTransport;
use std::sync::Arc;

pub(crate) struct Fixture {
    pub transport: MemoryTransport,
    pub clock: MockTimeProvider,
    pub broker: Broker,
}

pub(crate) fn fixture(config: BrokerConfig) -> Fixture {
    let clock = MockTimeProvider::new();
    let transport = MemoryTransport::with_clock(Arc::new(clock.clone()));
    let broker = Broker::new("test", Arc::new(transport.clone()), config)
        .unwrap()
        .with_clock(Arc::new(clock.clone()));
    Fixture {
        transport,
        clock,
        broker,
    }
}

/// Defaults with an immediate first retry
pub(crate) fn instant_retries() -> BrokerConfig {
    BrokerConfig {
        retry_delay_seconds: 0.0,
        ..BrokerConfig::default()
    }
}
