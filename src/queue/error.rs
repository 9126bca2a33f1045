//! Broker Error Types

use crate::core::error_handling::ContextualError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Corrupt record under '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Counter under '{key}' holds '{value}', expected an integer")]
    InvalidCounter { key: String, value: String },

    #[error("Failed to encode record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Position update for group '{group}' on stream '{stream}' lost {attempts} races in a row")]
    Contention {
        stream: String,
        group: String,
        attempts: usize,
    },

    #[error("Invalid broker configuration: {message}")]
    Config { message: String },

    #[error("Unknown broker '{name}'")]
    UnknownBroker { name: String },
}

impl BrokerError {
    pub(crate) fn corrupt(key: &str, source: serde_json::Error) -> Self {
        Self::Corrupt {
            key: key.to_string(),
            source,
        }
    }

    /// True for failures of the backing store rather than of the broker's own logic
    pub fn is_transport(&self) -> bool {
        matches!(self, BrokerError::Store(_))
    }
}

impl ContextualError for BrokerError {
    fn is_user_actionable(&self) -> bool {
        match self {
            BrokerError::Store(e) => e.is_user_actionable(),
            BrokerError::Config { .. } | BrokerError::UnknownBroker { .. } => true,
            _ => false,
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            BrokerError::Store(e) => e.user_message(),
            BrokerError::Config { .. } | BrokerError::UnknownBroker { .. } => {
                Some(self.to_string())
            }
            _ => None,
        }
    }
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;
