//! Cache trait 定义

use async_trait::async_trait;
use std::time::Duration;
use stockbridge_errors::AppResult;

/// 缓存 trait
///
/// 除了普通的字符串键值，还提供 hash 结构的批量操作，
/// 一个 hash 对应一个命名空间，字段之间互不影响。
#[async_trait]
pub trait CachePort: Send + Sync {
    /// 获取缓存值
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// 设置缓存值
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()>;

    /// 删除缓存（普通键或整个 hash）
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// 检查是否存在
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// 设置过期时间
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()>;

    /// 读取 hash 字段
    async fn hash_get(&self, key: &str, field: &str) -> AppResult<Option<String>>;

    /// 批量读取 hash 字段，结果与 `fields` 顺序一一对应
    async fn hash_get_many(&self, key: &str, fields: &[String]) -> AppResult<Vec<Option<String>>>;

    /// 批量写入 hash 字段
    async fn hash_set_many(&self, key: &str, entries: &[(String, String)]) -> AppResult<()>;

    /// hash 字段数量
    async fn hash_len(&self, key: &str) -> AppResult<u64>;

    /// 连通性检查
    async fn ping(&self) -> AppResult<()>;
}
