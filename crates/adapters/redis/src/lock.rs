//! Redis 分布式锁实现

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;
use std::time::Duration;
use stockbridge_errors::{AppError, AppResult};
use stockbridge_ports::DistributedLock;

/// 只删除自己持有的锁
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis 分布式锁（SET NX PX）
pub struct RedisDistributedLock {
    conn: ConnectionManager,
    lock_prefix: String,
    release_script: Script,
}

impl RedisDistributedLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            lock_prefix: "lock:".to_string(),
            release_script: Script::new(RELEASE_SCRIPT),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.lock_prefix = prefix.into();
        self
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}{}", self.lock_prefix, key)
    }
}

#[async_trait]
impl DistributedLock for RedisDistributedLock {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(self.lock_key(key))
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::cache(format!("Redis lock acquire failed: {}", e)))?;

        Ok(result.is_some())
    }

    async fn release(&self, key: &str, owner: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release_script
            .key(self.lock_key(key))
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::cache(format!("Redis lock release failed: {}", e)))?;

        Ok(deleted == 1)
    }
}
