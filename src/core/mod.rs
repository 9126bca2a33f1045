//! Core services and infrastructure

pub mod error_handling;
pub mod logging;
pub mod retry;
pub mod shutdown;
pub mod styles;
pub mod sync;
pub mod time;
pub mod version;
