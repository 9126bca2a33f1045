//! Named brokers built once at startup and handed to producers and consumers

use crate::queue::broker::Broker;
use crate::queue::error::{BrokerError, BrokerResult};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_BROKER: &str = "default";

/// Lookup table of brokers by name
///
/// The first registered broker becomes the default unless one is registered under
/// [`DEFAULT_BROKER`].
#[derive(Debug, Default)]
pub struct BrokerRegistry {
    brokers: BTreeMap<String, Arc<Broker>>,
    default_name: Option<String>,
}

impl BrokerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, broker: Broker) -> Arc<Broker> {
        let name = broker.name().to_string();
        let broker = Arc::new(broker);

        if self.default_name.is_none() || name == DEFAULT_BROKER {
            self.default_name = Some(name.clone());
        }
        if self.brokers.insert(name.clone(), broker.clone()).is_some() {
            log::warn!("Broker '{name}' registered twice; keeping the newer one");
        }
        broker
    }

    pub fn get(&self, name: &str) -> BrokerResult<Arc<Broker>> {
        self.brokers
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownBroker {
                name: name.to_string(),
            })
    }

    pub fn default_broker(&self) -> BrokerResult<Arc<Broker>> {
        let name = self.default_name.as_deref().unwrap_or(DEFAULT_BROKER);
        self.get(name)
    }

    /// Broker called `name`, or the default broker when `name` is `None`
    pub fn resolve(&self, name: Option<&str>) -> BrokerResult<Arc<Broker>> {
        match name {
            Some(name) => self.get(name),
            None => self.default_broker(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.brokers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.brokers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }
}
