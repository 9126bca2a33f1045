//! Message handlers driven by a stream consumer

use crate::consumer::error::HandlerError;
use crate::queue::Message;
use async_trait::async_trait;

/// Application logic invoked for every delivered message
///
/// `stream` is the lane the message was read from, so a handler can tell primary
/// traffic from backfill.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, stream: &str, message: &Message) -> Result<(), HandlerError>;
}

/// Logs every message and succeeds
#[derive(Debug, Clone)]
pub struct LoggingHandler {
    name: String,
}

impl LoggingHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LoggingHandler {
    fn default() -> Self {
        Self::new("log")
    }
}

#[async_trait]
impl BatchHandler for LoggingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, stream: &str, message: &Message) -> Result<(), HandlerError> {
        log::info!(
            "[{}] {} {} {}",
            self.name,
            stream,
            message.identifier,
            message.payload
        );
        Ok(())
    }
}
