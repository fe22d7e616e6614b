//! 分布式锁 trait 定义

use async_trait::async_trait;
use std::time::Duration;
use stockbridge_errors::AppResult;

/// 跨进程互斥锁
///
/// 锁带过期时间，持有者崩溃后自动失效。`owner` 是持有者自己生成的随机值，
/// 释放时校验，过期后被他人重新获取的锁不会被误删。
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// 尝试获取锁，不等待
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> AppResult<bool>;

    /// 释放锁，返回是否确实由 `owner` 持有并已删除
    async fn release(&self, key: &str, owner: &str) -> AppResult<bool>;
}
