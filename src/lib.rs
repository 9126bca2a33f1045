pub mod app;
pub mod consumer;
pub mod core;
pub mod queue;
pub mod store;
