//! Redis-backed transport
//!
//! Plain reads go through individual commands. Batches, including guarded batches and
//! list splices, run as one Lua script so each executes atomically on the server; this
//! plays the role of `WATCH`/`MULTI` without needing a dedicated connection per caller.

use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::Transport;
use crate::store::types::{Guard, StoreStatus, WriteBatch};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::collections::HashMap;

mod scripts {
    use redis::Script;

    /// Apply a JSON-encoded op list, guarded by zero or more watched keys
    ///
    /// ARGV[1] = ops; ARGV[i + 1] guards KEYS[i] and is "-" for absent or "v:<value>".
    pub fn apply_batch() -> Script {
        Script::new(
            r#"
            for i, key in ipairs(KEYS) do
                local expected = ARGV[i + 1]
                if expected == '-' then
                    if redis.call('EXISTS', key) == 1 then
                        return 0
                    end
                elseif redis.call('GET', key) ~= string.sub(expected, 3) then
                    return 0
                end
            end

            local ops = cjson.decode(ARGV[1])
            for _, op in ipairs(ops) do
                if op.op == 'set' then
                    if op.ttl_ms then
                        redis.call('SET', op.key, op.value, 'PX', op.ttl_ms)
                    else
                        redis.call('SET', op.key, op.value)
                    end
                elseif op.op == 'delete' then
                    redis.call('DEL', op.key)
                elseif op.op == 'incr_by' then
                    redis.call('INCRBY', op.key, op.delta)
                elseif op.op == 'hash_set' then
                    redis.call('HSET', op.key, op.field, op.value)
                elseif op.op == 'hash_delete' then
                    redis.call('HDEL', op.key, op.field)
                elseif op.op == 'set_add' then
                    redis.call('SADD', op.key, op.member)
                elseif op.op == 'set_remove' then
                    redis.call('SREM', op.key, op.member)
                elseif op.op == 'expire' then
                    redis.call('PEXPIRE', op.key, op.ttl_ms)
                elseif op.op == 'list_insert' and #op.values > 0 then
                    local tail = redis.call('LRANGE', op.key, op.index, -1)
                    if #tail > 0 then
                        if op.index == 0 then
                            redis.call('DEL', op.key)
                        else
                            redis.call('LTRIM', op.key, 0, op.index - 1)
                        end
                    end
                    for _, value in ipairs(op.values) do
                        redis.call('RPUSH', op.key, value)
                    end
                    for _, value in ipairs(tail) do
                        redis.call('RPUSH', op.key, value)
                    end
                end
            end
            return 1
            "#,
        )
    }
}

fn command_error(operation: &str, error: redis::RedisError) -> StoreError {
    let message = error.to_string();
    if error.is_connection_refusal() || error.is_io_error() || error.is_timeout() {
        StoreError::Unavailable { message }
    } else {
        StoreError::Command {
            operation: operation.to_string(),
            message,
        }
    }
}

/// [`Transport`] over a Redis server
#[derive(Clone)]
pub struct RedisTransport {
    conn: ConnectionManager,
    apply_script: Script,
}

impl std::fmt::Debug for RedisTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTransport")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisTransport {
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        log::info!("Connecting to Redis at {}", redis_url);

        let client = redis::Client::open(redis_url).map_err(|e| StoreError::Unavailable {
            message: format!("Failed to create Redis client: {e}"),
        })?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Unavailable {
                message: format!("Failed to connect to Redis: {e}"),
            })?;

        Ok(Self {
            conn,
            apply_script: scripts::apply_batch(),
        })
    }

    async fn run_batch(&self, guards: &[Guard], batch: WriteBatch) -> StoreResult<bool> {
        let ops = serde_json::to_string(batch.ops()).map_err(|e| StoreError::Command {
            operation: "apply".to_string(),
            message: format!("Failed to encode batch: {e}"),
        })?;
        let mut invocation = self.apply_script.prepare_invoke();
        invocation.arg(ops);
        for guard in guards {
            invocation.key(&guard.key);
            match &guard.expected {
                Some(value) => invocation.arg(format!("v:{value}")),
                None => invocation.arg("-"),
            };
        }
        let mut conn = self.conn.clone();
        let applied: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| command_error("apply", e))?;
        Ok(applied == 1)
    }
}

#[async_trait]
impl Transport for RedisTransport {
    fn name(&self) -> &str {
        "redis"
    }

    async fn status(&self) -> StoreResult<StoreStatus> {
        let mut conn = self.conn.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(StoreStatus::Ready),
            Err(e) if e.to_string().contains("LOADING") => Ok(StoreStatus::Loading {
                message: e.to_string(),
            }),
            Err(e) if e.is_connection_refusal() || e.is_io_error() || e.is_timeout() => {
                Err(command_error("PING", e))
            }
            Err(e) => Ok(StoreStatus::Degraded {
                message: e.to_string(),
            }),
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("GET", e))
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        redis::cmd("SETNX")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("SETNX", e))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        redis::cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("INCRBY", e))
    }

    async fn list_push(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("RPUSH", e))
    }

    async fn list_index(&self, key: &str, index: u64) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("LINDEX")
            .arg(key)
            .arg(index)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("LINDEX", e))
    }

    async fn list_len(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        redis::cmd("LLEN")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("LLEN", e))
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("HGET", e))
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("HGETALL", e))
    }

    async fn hash_len(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        redis::cmd("HLEN")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("HLEN", e))
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("SMEMBERS", e))?;
        members.sort();
        Ok(members)
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        redis::cmd("SISMEMBER")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("SISMEMBER", e))
    }

    async fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.run_batch(&[], batch).await.map(|_| ())
    }

    async fn compare_and_apply(&self, guards: &[Guard], batch: WriteBatch) -> StoreResult<bool> {
        self.run_batch(guards, batch).await
    }

    async fn flush(&self) -> StoreResult<()> {
        log::warn!("Flushing Redis database");
        let mut conn = self.conn.clone();
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| command_error("FLUSHDB", e))
    }
}
