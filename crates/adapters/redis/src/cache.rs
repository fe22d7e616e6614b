//! Redis Cache 实现

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use stockbridge_errors::{AppError, AppResult};
use stockbridge_ports::CachePort;


/// Redis Cache
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl CachePort for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| AppError::cache(format!("Redis get failed: {}", e)))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(duration) => conn
                .set_ex(key, value, duration.as_secs())
                .await
                .map_err(|e| AppError::cache(format!("Redis set failed: {}", e))),
            None => conn
                .set(key, value)
                .await
                .map_err(|e| AppError::cache(format!("Redis set failed: {}", e))),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.del(key)
            .await
            .map_err(|e| AppError::cache(format!("Redis delete failed: {}", e)))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        conn.exists(key)
            .await
            .map_err(|e| AppError::cache(format!("Redis exists failed: {}", e)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.expire(key, ttl.as_secs() as i64)
            .await
            .map_err(|e| AppError::cache(format!("Redis expire failed: {}", e)))
    }

    async fn hash_get(&self, key: &str, field: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.hget(key, field)
            .await
            .map_err(|e| AppError::cache(format!("Redis hget failed: {}", e)))
    }

    async fn hash_get_many(&self, key: &str, fields: &[String]) -> AppResult<Vec<Option<String>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        // HMGET 单字段时也返回数组，避免 hget 的单值语义
        redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::cache(format!("Redis hmget failed: {}", e)))
    }

    async fn hash_set_many(&self, key: &str, entries: &[(String, String)]) -> AppResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.hset_multiple(key, entries)
            .await
            .map_err(|e| AppError::cache(format!("Redis hset failed: {}", e)))
    }

    async fn hash_len(&self, key: &str) -> AppResult<u64> {
        let mut conn = self.conn.clone();
        conn.hlen(key)
            .await
            .map_err(|e| AppError::cache(format!("Redis hlen failed: {}", e)))
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        crate::connection::ping(&mut conn).await
    }
}
