//! Generic error handling utilities
//!
//! Distinguishes errors an operator can act on directly (bad configuration, unknown
//! broker name) from system failures (store unreachable) when reporting fatal errors.

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)`; otherwise it returns `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a specific message the operator can act on
    fn is_user_actionable(&self) -> bool;

    /// The operator-facing message for user-actionable errors
    fn user_message(&self) -> Option<String>;
}

/// Log errors with appropriate detail level based on error specificity
///
/// User-actionable errors are logged with their own message; system errors are
/// logged with the operation context, and the full error goes to debug level.
///
/// # Examples
/// ```rust,no_run
/// # use lanequeue::core::error_handling::log_error_with_context;
/// # use lanequeue::app::config::ConfigError;
/// let err = ConfigError::Invalid { message: "max_retries must be >= 0".into() };
/// log_error_with_context(&err, "Loading configuration");
/// // Logs: "FATAL: Invalid configuration: max_retries must be >= 0"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => log::error!("FATAL: {}", user_msg),
        _ => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct TestUserError {
        message: String,
    }

    impl fmt::Display for TestUserError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl std::error::Error for TestUserError {}

    impl ContextualError for TestUserError {
        fn is_user_actionable(&self) -> bool {
            true
        }

        fn user_message(&self) -> Option<String> {
            Some(self.message.clone())
        }
    }

    #[derive(Debug)]
    struct TestSystemError;

    impl fmt::Display for TestSystemError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "System error: connection refused")
        }
    }

    impl std::error::Error for TestSystemError {}

    impl ContextualError for TestSystemError {
        fn is_user_actionable(&self) -> bool {
            false
        }

        fn user_message(&self) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_user_actionable_error_shows_specific_message() {
        let error = TestUserError {
            message: "Unknown broker 'orders'".to_string(),
        };

        assert!(error.is_user_actionable());
        assert_eq!(error.user_message().as_deref(), Some("Unknown broker 'orders'"));
        log_error_with_context(&error, "Selecting broker");
    }

    #[test]
    fn test_system_error_uses_generic_context() {
        let error = TestSystemError;

        assert!(!error.is_user_actionable());
        assert_eq!(error.user_message(), None);
        log_error_with_context(&error, "Connecting to store");
    }
}
