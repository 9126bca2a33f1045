//! Time provider abstraction for testable time-dependent logic
//!
//! The broker stores every timestamp as seconds since the Unix epoch (`f64`),
//! so the provider exposes that form directly alongside the raw clocks.

#[cfg(test)]
use std::sync::{Arc, Mutex};
#[cfg(test)]
use std::time::Duration;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Abstraction over system time for testable time-dependent logic
pub trait TimeProvider: Send + Sync {
    /// Get the current monotonic time (for measuring intervals)
    fn now(&self) -> Instant;

    /// Get the current system time (for timestamps)
    fn system_time(&self) -> SystemTime;

    /// Current system time as fractional seconds since the Unix epoch
    fn epoch_seconds(&self) -> f64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Production time provider using actual system time
#[derive(Debug, Default, Clone)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Mock time provider for deterministic testing
#[derive(Clone)]
#[cfg(test)]
pub struct MockTimeProvider {
    current_instant: Arc<Mutex<Instant>>,
    current_system_time: Arc<Mutex<SystemTime>>,
}

#[cfg(test)]
impl MockTimeProvider {
    pub fn new() -> Self {
        Self {
            current_instant: Arc::new(Mutex::new(Instant::now())),
            current_system_time: Arc::new(Mutex::new(SystemTime::now())),
        }
    }

    /// Advance both monotonic and system time by the given duration
    pub fn advance_time(&self, duration: Duration) {
        {
            let mut instant = self.current_instant.lock().unwrap();
            *instant += duration;
        }
        {
            let mut system_time = self.current_system_time.lock().unwrap();
            *system_time += duration;
        }
    }
}

#[cfg(test)]
impl TimeProvider for MockTimeProvider {
    fn now(&self) -> Instant {
        *self.current_instant.lock().unwrap()
    }

    fn system_time(&self) -> SystemTime {
        *self.current_system_time.lock().unwrap()
    }
}
