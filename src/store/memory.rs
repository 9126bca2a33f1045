//! Process-local transport
//!
//! All state lives behind one mutex, so every batch is trivially atomic and the
//! compare-and-apply check happens under the same lock as the writes. Expiry is
//! lazy: expired keys are evicted on the next access.

use crate::core::sync::handle_mutex_poison;
use crate::core::time::{SystemTimeProvider, TimeProvider};
use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::Transport;
use crate::store::types::{Guard, StoreStatus, WriteBatch, WriteOp};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct StoreState {
    strings: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
    expiries: HashMap<String, Instant>,
}

impl StoreState {
    fn evict_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .expiries
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            self.remove_key(&key);
        }
    }

    fn remove_key(&mut self, key: &str) {
        self.strings.remove(key);
        self.lists.remove(key);
        self.hashes.remove(key);
        self.sets.remove(key);
        self.expiries.remove(key);
    }

    fn exists(&self, key: &str) -> bool {
        self.strings.contains_key(key)
            || self.lists.contains_key(key)
            || self.hashes.contains_key(key)
            || self.sets.contains_key(key)
    }

    fn parse_int(&self, key: &str) -> StoreResult<i64> {
        match self.strings.get(key) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| StoreError::wrong_type(key, "value is not an integer")),
            None => Ok(0),
        }
    }

    fn incr_by(&mut self, key: &str, delta: i64) -> StoreResult<i64> {
        let next = self.parse_int(key)? + delta;
        self.strings.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    fn validate(&self, batch: &WriteBatch) -> StoreResult<()> {
        for op in batch.ops() {
            if let WriteOp::IncrBy { key, .. } = op {
                self.parse_int(key)?;
            }
        }
        Ok(())
    }

    fn apply_op(&mut self, op: WriteOp, now: Instant) -> StoreResult<()> {
        match op {
            WriteOp::Set { key, value, ttl_ms } => {
                self.remove_key(&key);
                if let Some(ttl) = ttl_ms {
                    self.expiries
                        .insert(key.clone(), now + Duration::from_millis(ttl));
                }
                self.strings.insert(key, value);
            }
            WriteOp::Delete { key } => self.remove_key(&key),
            WriteOp::IncrBy { key, delta } => {
                self.incr_by(&key, delta)?;
            }
            WriteOp::HashSet { key, field, value } => {
                self.hashes.entry(key).or_default().insert(field, value);
            }
            WriteOp::HashDelete { key, field } => {
                if let Some(hash) = self.hashes.get_mut(&key) {
                    hash.remove(&field);
                    if hash.is_empty() {
                        self.remove_key(&key);
                    }
                }
            }
            WriteOp::SetAdd { key, member } => {
                self.sets.entry(key).or_default().insert(member);
            }
            WriteOp::SetRemove { key, member } => {
                if let Some(set) = self.sets.get_mut(&key) {
                    set.remove(&member);
                    if set.is_empty() {
                        self.remove_key(&key);
                    }
                }
            }
            WriteOp::Expire { key, ttl_ms } => {
                if self.exists(&key) {
                    self.expiries
                        .insert(key, now + Duration::from_millis(ttl_ms));
                }
            }
            WriteOp::ListInsert { key, index, values } => {
                let list = self.lists.entry(key).or_default();
                let at = (index as usize).min(list.len());
                list.splice(at..at, values);
            }
        }
        Ok(())
    }

    fn apply_batch(&mut self, batch: WriteBatch, now: Instant) -> StoreResult<()> {
        self.validate(&batch)?;
        for op in batch.into_ops() {
            self.apply_op(op, now)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
struct Faults {
    unavailable: bool,
    status: Option<StoreStatus>,
    conflicts: usize,
}

/// In-memory [`Transport`] shared by every broker handle in the process
#[derive(Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn TimeProvider>,
    #[cfg(test)]
    faults: Arc<Mutex<Faults>>,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport").finish_non_exhaustive()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemTimeProvider))
    }

    /// Create a transport whose key expiry follows the given clock
    pub fn with_clock(clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            clock,
            #[cfg(test)]
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// Lock the state after evicting expired keys
    fn lock(&self) -> StoreResult<MutexGuard<'_, StoreState>> {
        self.check_available()?;
        let mut state = handle_mutex_poison(self.state.lock(), |message| {
            StoreError::Poisoned { message }
        })?;
        state.evict_expired(self.clock.now());
        Ok(state)
    }

    #[cfg(not(test))]
    fn check_available(&self) -> StoreResult<()> {
        Ok(())
    }

    #[cfg(test)]
    fn check_available(&self) -> StoreResult<()> {
        if self.faults.lock().unwrap().unavailable {
            return Err(StoreError::Unavailable {
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn take_injected_conflict(&self) -> bool {
        false
    }

    #[cfg(test)]
    fn take_injected_conflict(&self) -> bool {
        let mut faults = self.faults.lock().unwrap();
        if faults.conflicts > 0 {
            faults.conflicts -= 1;
            true
        } else {
            false
        }
    }

    /// Make every subsequent operation fail as if the store were unreachable
    #[cfg(test)]
    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unwrap().unavailable = unavailable;
    }

    /// Override the status reported by [`Transport::status`]
    #[cfg(test)]
    pub(crate) fn set_status(&self, status: StoreStatus) {
        self.faults.lock().unwrap().status = Some(status);
    }

    /// Make the next `count` compare-and-apply calls lose their race
    #[cfg(test)]
    pub(crate) fn inject_conflicts(&self, count: usize) {
        self.faults.lock().unwrap().conflicts = count;
    }

    #[cfg(not(test))]
    fn status_override(&self) -> Option<StoreStatus> {
        None
    }

    #[cfg(test)]
    fn status_override(&self) -> Option<StoreStatus> {
        self.faults.lock().unwrap().status.clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn status(&self) -> StoreResult<StoreStatus> {
        self.check_available()?;
        Ok(self.status_override().unwrap_or(StoreStatus::Ready))
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let state = self.lock()?;
        Ok(state.strings.get(key).cloned())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut state = self.lock()?;
        if state.exists(key) {
            return Ok(false);
        }
        state.strings.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        self.lock()?.incr_by(key, delta)
    }

    async fn list_push(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let list = state.lists.entry(key.to_string()).or_default();
        list.push(value.to_string());
        Ok(list.len() as u64)
    }

    async fn list_index(&self, key: &str, index: u64) -> StoreResult<Option<String>> {
        let state = self.lock()?;
        Ok(state
            .lists
            .get(key)
            .and_then(|list| list.get(index as usize))
            .cloned())
    }

    async fn list_len(&self, key: &str) -> StoreResult<u64> {
        let state = self.lock()?;
        Ok(state.lists.get(key).map_or(0, |list| list.len() as u64))
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let state = self.lock()?;
        Ok(state.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let state = self.lock()?;
        Ok(state.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_len(&self, key: &str) -> StoreResult<u64> {
        let state = self.lock()?;
        Ok(state.hashes.get(key).map_or(0, |h| h.len() as u64))
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let state = self.lock()?;
        Ok(state
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        let state = self.lock()?;
        Ok(state.sets.get(key).is_some_and(|set| set.contains(member)))
    }

    async fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        let now = self.clock.now();
        self.lock()?.apply_batch(batch, now)
    }

    async fn compare_and_apply(&self, guards: &[Guard], batch: WriteBatch) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        if self.take_injected_conflict() {
            return Ok(false);
        }
        let holds = |guard: &Guard| state.strings.get(&guard.key) == guard.expected.as_ref();
        if !guards.iter().all(holds) {
            return Ok(false);
        }
        state.apply_batch(batch, now)?;
        Ok(true)
    }

    async fn flush(&self) -> StoreResult<()> {
        *self.lock()? = StoreState::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::MockTimeProvider;

    #[tokio::test]
    async fn test_list_insert_splices_before_index() {
        let store = MemoryTransport::new();
        for value in ["a", "b", "c"] {
            store.list_push("stream:s", value).await.unwrap();
        }

        store
            .apply(WriteBatch::new().list_insert(
                "stream:s",
                1,
                ["x".to_string(), "y".to_string()],
            ))
            .await
            .unwrap();

        assert_eq!(store.list_len("stream:s").await.unwrap(), 5);
        assert_eq!(store.list_index("stream:s", 1).await.unwrap().as_deref(), Some("x"));
        assert_eq!(store.list_index("stream:s", 3).await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_list_insert_past_end_appends() {
        let store = MemoryTransport::new();
        store.list_push("l", "a").await.unwrap();
        store
            .apply(WriteBatch::new().list_insert("l", 10, ["z".to_string()]))
            .await
            .unwrap();
        assert_eq!(store.list_index("l", 1).await.unwrap().as_deref(), Some("z"));
    }

    #[tokio::test]
    async fn test_compare_and_apply_rejects_changed_key() {
        let store = MemoryTransport::new();
        store.set_if_absent("position:s:g", "0").await.unwrap();
        let guard = [Guard::new("position:s:g", Some("0"))];

        let applied = store
            .compare_and_apply(&guard, WriteBatch::new().set("position:s:g", "1"))
            .await
            .unwrap();
        assert!(applied);

        // A second writer that still believes the value is "0" loses
        let stale = store
            .compare_and_apply(&guard, WriteBatch::new().set("position:s:g", "7"))
            .await
            .unwrap();
        assert!(!stale);
        assert_eq!(store.get("position:s:g").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_compare_and_apply_checks_every_guard() {
        let store = MemoryTransport::new();
        store.set_if_absent("position:s:g", "0").await.unwrap();
        store.incr_by("generation:s:g", 1).await.unwrap();

        let guards = [
            Guard::new("position:s:g", Some("0")),
            Guard::new("generation:s:g", None),
        ];
        let applied = store
            .compare_and_apply(&guards, WriteBatch::new().list_insert("stream:s", 0, ["m".to_string()]))
            .await
            .unwrap();

        assert!(!applied);
        assert_eq!(store.list_len("stream:s").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_validation_writes_nothing() {
        let store = MemoryTransport::new();
        store
            .apply(WriteBatch::new().set("not-a-number", "abc"))
            .await
            .unwrap();

        let result = store
            .apply(
                WriteBatch::new()
                    .hash_set("h", "f", "v")
                    .incr_by("not-a-number", 1),
            )
            .await;

        assert!(matches!(result, Err(StoreError::WrongType { .. })));
        assert_eq!(store.hash_len("h").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_keys_expire_with_clock() {
        let clock = MockTimeProvider::new();
        let store = MemoryTransport::with_clock(Arc::new(clock.clone()));
        store
            .apply(
                WriteBatch::new()
                    .set_add("ownership:m1", "s:g")
                    .expire("ownership:m1", Duration::from_secs(30))
                    .set_with_ttl("op_state:g:m1", "ACKED", Duration::from_secs(5)),
            )
            .await
            .unwrap();

        clock.advance_time(Duration::from_secs(6));
        assert!(store.get("op_state:g:m1").await.unwrap().is_none());
        assert!(store.set_contains("ownership:m1", "s:g").await.unwrap());

        clock.advance_time(Duration::from_secs(30));
        assert!(!store.set_contains("ownership:m1", "s:g").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_hash_is_removed() {
        let store = MemoryTransport::new();
        store
            .apply(WriteBatch::new().hash_set("h", "f", "v").expire("h", Duration::from_secs(60)))
            .await
            .unwrap();
        store.apply(WriteBatch::new().hash_delete("h", "f")).await.unwrap();

        // Re-created hash must not inherit the old expiry
        store.apply(WriteBatch::new().hash_set("h", "g", "v")).await.unwrap();
        let state = store.state.lock().unwrap();
        assert!(!state.expiries.contains_key("h"));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = MemoryTransport::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.list_len("stream:s").await,
            Err(StoreError::Unavailable { .. })
        ));
        assert!(store.status().await.is_err());
    }

    #[tokio::test]
    async fn test_flush_clears_everything() {
        let store = MemoryTransport::new();
        store.list_push("stream:s", "a").await.unwrap();
        store.incr_by("position:s:g", 3).await.unwrap();

        store.flush().await.unwrap();

        assert_eq!(store.list_len("stream:s").await.unwrap(), 0);
        assert!(store.get("position:s:g").await.unwrap().is_none());
    }
}
