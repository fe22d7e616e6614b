//! 按编码加锁
//!
//! 同一编码同一时刻最多只有一个 upsert 在创建卡片。进程内用 `DashMap` 里的互斥锁排队，
//! 配置了共享后端时再取一把跨进程锁，多个副本之间同样互斥。
//! 本地锁条目在最后一个持有者释放后移除。

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use stockbridge_common::retry::sleep_or_cancel;
use stockbridge_ports::DistributedLock;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics;

/// 跨进程锁参数
#[derive(Debug, Clone)]
pub struct RemoteLockSettings {
    /// 锁过期时间
    pub ttl: Duration,
    /// 最长等待时间
    pub wait: Duration,
    /// 轮询间隔
    pub poll_interval: Duration,
    pub key_prefix: String,
}

impl Default for RemoteLockSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            wait: Duration::from_secs(330),
            poll_interval: Duration::from_millis(200),
            key_prefix: "catalog-sync:code-lock:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockWaitError {
    #[error("Cancelled while waiting for code lock")]
    Cancelled,
    #[error("Timed out waiting for code lock")]
    Timeout,
}

struct RemoteLock {
    backend: Arc<dyn DistributedLock>,
    settings: RemoteLockSettings,
}

/// 已取得的跨进程锁
struct HeldRemote {
    backend: Arc<dyn DistributedLock>,
    key: String,
    owner: String,
}

impl HeldRemote {
    async fn release(self) {
        match self.backend.release(&self.key, &self.owner).await {
            Ok(true) => debug!(key = %self.key, "Code lock released"),
            Ok(false) => warn!(key = %self.key, "Code lock expired before release"),
            Err(e) => warn!(key = %self.key, error = %e, "Failed to release code lock"),
        }
    }
}

#[derive(Default)]
pub struct CodeLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
    remote: Option<RemoteLock>,
}

/// 持有期间独占该编码
///
/// 优先调用 [`CodeLockGuard::release`]；直接 drop 时跨进程锁在后台释放
pub struct CodeLockGuard<'a> {
    owner: &'a CodeLocks,
    code: String,
    guard: Option<OwnedMutexGuard<()>>,
    remote: Option<HeldRemote>,
}

impl CodeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 叠加跨进程锁
    pub fn with_remote(mut self, backend: Arc<dyn DistributedLock>, settings: RemoteLockSettings) -> Self {
        self.remote = Some(RemoteLock { backend, settings });
        self
    }

    pub fn is_distributed(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn lock(
        &self,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<CodeLockGuard<'_>, LockWaitError> {
        let mutex = self
            .locks
            .entry(code.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let local = tokio::select! {
            _ = cancel.cancelled() => None,
            guard = mutex.clone().lock_owned() => Some(guard),
        };
        let Some(local) = local else {
            drop(mutex);
            self.locks.remove_if(code, |_, m| Arc::strong_count(m) == 1);
            return Err(LockWaitError::Cancelled);
        };

        let mut guard = CodeLockGuard {
            owner: self,
            code: code.to_string(),
            guard: Some(local),
            remote: None,
        };
        if let Some(remote) = &self.remote {
            guard.remote = Self::acquire_remote(remote, code, cancel).await?;
        }
        Ok(guard)
    }

    /// 后端不可用时退化为只有本地锁
    async fn acquire_remote(
        remote: &RemoteLock,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<HeldRemote>, LockWaitError> {
        let key = format!("{}{}", remote.settings.key_prefix, code);
        let owner = Uuid::now_v7().to_string();
        let deadline = tokio::time::Instant::now() + remote.settings.wait;

        loop {
            match remote.backend.try_acquire(&key, &owner, remote.settings.ttl).await {
                Ok(true) => {
                    return Ok(Some(HeldRemote {
                        backend: remote.backend.clone(),
                        key,
                        owner,
                    }));
                }
                Ok(false) => {}
                Err(e) => {
                    metrics::record_cache_unavailable();
                    warn!(key = %key, error = %e, "Code lock backend unavailable, continuing with local lock");
                    return Ok(None);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(key = %key, wait_secs = remote.settings.wait.as_secs(), "Timed out waiting for code lock");
                return Err(LockWaitError::Timeout);
            }
            if !sleep_or_cancel(remote.settings.poll_interval, cancel).await {
                return Err(LockWaitError::Cancelled);
            }
        }
    }

    /// 当前被持有或等待中的编码数量
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl CodeLockGuard<'_> {
    /// 先释放跨进程锁，再释放本地锁
    pub async fn release(mut self) {
        if let Some(remote) = self.remote.take() {
            remote.release().await;
        }
    }
}

impl Drop for CodeLockGuard<'_> {
    fn drop(&mut self) {
        if let Some(remote) = self.remote.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(remote.release());
            }
        }
        self.guard.take();
        // 只剩 map 自身持有时说明没有其他等待者
        self.owner
            .locks
            .remove_if(&self.code, |_, m| Arc::strong_count(m) == 1);
    }
}
