//! Consumer Error Types

use crate::core::error_handling::ContextualError;
use crate::queue::BrokerError;

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Invalid consumer configuration: {message}")]
    Config { message: String },

    #[error("Consumer task '{name}' failed: {message}")]
    Task { name: String, message: String },
}

impl ContextualError for ConsumerError {
    fn is_user_actionable(&self) -> bool {
        match self {
            ConsumerError::Broker(e) => e.is_user_actionable(),
            ConsumerError::Config { .. } => true,
            ConsumerError::Task { .. } => false,
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            ConsumerError::Broker(e) => e.user_message(),
            ConsumerError::Config { .. } => Some(self.to_string()),
            ConsumerError::Task { .. } => None,
        }
    }
}

/// Error returned by a [`BatchHandler`](crate::consumer::BatchHandler) for one message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("{message}")]
    Failed { message: String },

    #[error("Payload rejected: {message}")]
    InvalidPayload { message: String },
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }
}

/// Result type for consumer operations
pub type ConsumerResult<T> = Result<T, ConsumerError>;
