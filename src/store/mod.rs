//! Shared Store Primitive
//!
//! The broker never talks to a backend directly; it only sees the [`Transport`] trait.
//! Each backend gets one implementation:
//!
//! - [`MemoryTransport`]: process-local, used by tests, demos and single-process setups
//! - `RedisTransport`: shared store for multi-process deployments (`redis` feature)
//!
//! ```text
//!  Broker ──► Transport ──┬──► MemoryTransport (Mutex<StoreState>)
//!                          └──► RedisTransport  (Lua scripts for atomic batches)
//! ```

mod error;
mod memory;
#[cfg(feature = "redis")]
mod redis_backend;
mod traits;
mod types;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryTransport;
#[cfg(feature = "redis")]
pub use redis_backend::RedisTransport;
pub use traits::Transport;
pub use types::{Guard, StoreStatus, WriteBatch, WriteOp};
