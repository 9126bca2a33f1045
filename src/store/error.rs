//! Store Error Types

use crate::core::error_handling::ContextualError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Store operation '{operation}' failed: {message}")]
    Command { operation: String, message: String },

    #[error("Key '{key}' holds a value of the wrong type: {message}")]
    WrongType { key: String, message: String },

    #[error("Store state poisoned: {message}")]
    Poisoned { message: String },
}

impl StoreError {
    pub(crate) fn wrong_type(key: &str, message: impl Into<String>) -> Self {
        Self::WrongType {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

impl ContextualError for StoreError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }

    fn user_message(&self) -> Option<String> {
        match self {
            StoreError::Unavailable { .. } => Some(self.to_string()),
            _ => None,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
