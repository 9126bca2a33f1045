//! Write batches and status types shared by all transports

use serde::Serialize;
use std::time::Duration;

/// A single mutation inside an atomic batch
///
/// Serialised as JSON for transports that apply batches server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    Set {
        key: String,
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        ttl_ms: Option<u64>,
    },
    Delete {
        key: String,
    },
    IncrBy {
        key: String,
        delta: i64,
    },
    HashSet {
        key: String,
        field: String,
        value: String,
    },
    HashDelete {
        key: String,
        field: String,
    },
    SetAdd {
        key: String,
        member: String,
    },
    SetRemove {
        key: String,
        member: String,
    },
    Expire {
        key: String,
        ttl_ms: u64,
    },
    /// Splice `values` into a list before `index` (clamped to the length)
    ListInsert {
        key: String,
        index: u64,
        values: Vec<String>,
    },
}

/// Value a key must still hold for a conditional batch to commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub key: String,
    /// `None` means the key must be absent
    pub expected: Option<String>,
}

impl Guard {
    pub fn new(key: impl Into<String>, expected: Option<&str>) -> Self {
        Self {
            key: key.into(),
            expected: expected.map(str::to_string),
        }
    }
}

/// Ordered list of writes applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Set {
            key: key.into(),
            value: value.into(),
            ttl_ms: None,
        });
        self
    }

    pub fn set_with_ttl(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        self.ops.push(WriteOp::Set {
            key: key.into(),
            value: value.into(),
            ttl_ms: Some(ttl_millis(ttl)),
        });
        self
    }

    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    pub fn incr_by(mut self, key: impl Into<String>, delta: i64) -> Self {
        self.ops.push(WriteOp::IncrBy {
            key: key.into(),
            delta,
        });
        self
    }

    pub fn hash_set(
        mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.ops.push(WriteOp::HashSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn hash_delete(mut self, key: impl Into<String>, field: impl Into<String>) -> Self {
        self.ops.push(WriteOp::HashDelete {
            key: key.into(),
            field: field.into(),
        });
        self
    }

    pub fn set_add(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::SetAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn set_remove(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::SetRemove {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn expire(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.ops.push(WriteOp::Expire {
            key: key.into(),
            ttl_ms: ttl_millis(ttl),
        });
        self
    }

    pub fn list_insert(
        mut self,
        key: impl Into<String>,
        index: u64,
        values: impl IntoIterator<Item = String>,
    ) -> Self {
        self.ops.push(WriteOp::ListInsert {
            key: key.into(),
            index,
            values: values.into_iter().collect(),
        });
        self
    }

    /// Append every op of `other` after the ops already queued
    pub fn extend(mut self, other: WriteBatch) -> Self {
        self.ops.extend(other.ops);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Readiness of the backing store as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStatus {
    Ready,
    /// Reachable but not serving yet (e.g. loading a snapshot)
    Loading { message: String },
    /// Reachable but refusing work
    Degraded { message: String },
}
