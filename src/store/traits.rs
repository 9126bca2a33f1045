//! The shared store primitive the broker is built on
//!
//! A transport offers ordered lists, hashes, sets and strings with per-key expiry,
//! atomic increments, and an atomic batch that can be made conditional on watched keys.

use crate::store::error::StoreResult;
use crate::store::types::{Guard, StoreStatus, WriteBatch};
use async_trait::async_trait;
use std::collections::HashMap;

/// Key/list/hash store used by the broker engine
///
/// Implementations must apply a [`WriteBatch`] atomically: either every op is
/// visible to other callers or none is.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Short backend name, e.g. `memory` or `redis`
    fn name(&self) -> &str;

    /// Check the backend; errors mean the store could not be reached at all
    async fn status(&self) -> StoreResult<StoreStatus>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set `key` only if it does not exist yet; returns whether the write happened
    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Atomically add `delta` to an integer key (missing keys count as 0)
    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64>;

    /// Append to the tail of a list, returning the new length
    async fn list_push(&self, key: &str, value: &str) -> StoreResult<u64>;

    async fn list_index(&self, key: &str, index: u64) -> StoreResult<Option<String>>;

    async fn list_len(&self, key: &str) -> StoreResult<u64>;

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    async fn hash_len(&self, key: &str) -> StoreResult<u64>;

    /// Members of a set, sorted
    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Apply a batch unconditionally
    async fn apply(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Apply a batch only if every guarded key still holds its expected value
    ///
    /// Returns `false` without writing anything when any guard fails.
    async fn compare_and_apply(&self, guards: &[Guard], batch: WriteBatch) -> StoreResult<bool>;

    /// Remove every key
    async fn flush(&self) -> StoreResult<()>;
}
