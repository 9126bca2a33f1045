//! Lock helpers
//!
//! A task that panics while holding a store lock poisons it. Every later access
//! then reports an error instead of panicking in turn.

use std::sync::LockResult;

/// Map a poisoned lock into an error built by `error_constructor`
///
/// ```
/// use std::sync::Mutex;
/// use lanequeue::core::sync::handle_mutex_poison;
/// use lanequeue::store::StoreError;
///
/// let state = Mutex::new(vec!["stream:orders"]);
/// let guard = handle_mutex_poison(state.lock(), |message| StoreError::Poisoned { message })
///     .unwrap();
/// assert_eq!(guard.len(), 1);
/// ```
pub fn handle_mutex_poison<T, E>(
    result: LockResult<T>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<T, E> {
    result.map_err(|poisoned| {
        error_constructor(format!(
            "store lock poisoned by a panicking task ({poisoned})"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn test_unpoisoned_lock_passes_through() {
        let state = Mutex::new(3u64);
        let guard = handle_mutex_poison(state.lock(), |message| StoreError::Poisoned { message });
        assert_eq!(*guard.unwrap(), 3);
    }

    #[test]
    fn test_poisoned_lock_becomes_store_error() {
        let state = Arc::new(Mutex::new(0u64));
        let writer = Arc::clone(&state);

        let _ = thread::spawn(move || {
            let _guard = writer.lock().unwrap();
            panic!("panic while holding the store lock");
        })
        .join();

        let error = handle_mutex_poison(state.lock(), |message| StoreError::Poisoned { message })
            .unwrap_err();
        match error {
            StoreError::Poisoned { message } => assert!(message.contains("poisoned")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
