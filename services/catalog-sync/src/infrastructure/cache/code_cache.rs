//! 编码缓存
//!
//! 规范化编码 -> 下游卡片 ID。缓存只是优化手段，后端不可用时
//! 所有操作降级为未命中，不向调用方返回错误。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use stockbridge_errors::AppError;
use stockbridge_ports::CachePort;
use tracing::{debug, info, warn};

use crate::domain::value_objects::{DownstreamId, canonicalize};
use crate::metrics;

/// 默认 hash 键
pub const DEFAULT_CACHE_KEY: &str = "catalog-sync:code-cache";

/// 缓存状态
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub healthy: bool,
    pub count: u64,
    pub warmed: bool,
    pub message: String,
}

/// 编码缓存
pub struct CodeCache {
    store: Arc<dyn CachePort>,
    hash_key: String,
    warm_key: String,
    ttl: Option<Duration>,
    warmed: AtomicBool,
}

impl CodeCache {
    pub fn new(store: Arc<dyn CachePort>) -> Self {
        Self::with_key(store, DEFAULT_CACHE_KEY)
    }

    pub fn with_key(store: Arc<dyn CachePort>, hash_key: impl Into<String>) -> Self {
        let hash_key = hash_key.into();
        Self {
            store,
            warm_key: format!("{}:warmed-at", hash_key),
            hash_key,
            ttl: None,
            warmed: AtomicBool::new(false),
        }
    }

    /// 批量写入后刷新整个 hash 的过期时间
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn unavailable(&self, operation: &str, error: &AppError) {
        metrics::record_cache_unavailable();
        warn!(
            operation,
            key = %self.hash_key,
            error = %error,
            "Code cache unavailable, degrading to remote lookup"
        );
    }

    fn parse_id(code: &str, raw: &str) -> Option<DownstreamId> {
        match raw.parse::<DownstreamId>() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(code, value = raw, error = %e, "Ignoring malformed cache entry");
                None
            }
        }
    }

    /// 查询单个编码
    pub async fn get(&self, code: &str) -> Option<DownstreamId> {
        let key = canonicalize(code);
        if key.is_empty() {
            return None;
        }
        match self.store.hash_get(&self.hash_key, &key).await {
            Ok(value) => {
                let id = value.as_deref().and_then(|raw| Self::parse_id(&key, raw));
                metrics::record_cache_operation("get", id.is_some());
                id
            }
            Err(e) => {
                self.unavailable("get", &e);
                None
            }
        }
    }

    /// 批量查询，只返回命中的编码（键为规范化编码）
    pub async fn get_many(&self, codes: &[String]) -> HashMap<String, DownstreamId> {
        let mut keys: Vec<String> = codes
            .iter()
            .map(|c| canonicalize(c))
            .filter(|c| !c.is_empty())
            .collect();
        keys.sort();
        keys.dedup();
        if keys.is_empty() {
            return HashMap::new();
        }

        match self.store.hash_get_many(&self.hash_key, &keys).await {
            Ok(values) => {
                let found: HashMap<String, DownstreamId> = keys
                    .into_iter()
                    .zip(values)
                    .filter_map(|(key, value)| {
                        let id = value.as_deref().and_then(|raw| Self::parse_id(&key, raw))?;
                        Some((key, id))
                    })
                    .collect();
                debug!(requested = codes.len(), hits = found.len(), "Code cache batch lookup");
                found
            }
            Err(e) => {
                self.unavailable("get_many", &e);
                HashMap::new()
            }
        }
    }

    /// 写入单个编码
    pub async fn set(&self, code: &str, id: DownstreamId) {
        let key = canonicalize(code);
        if key.is_empty() {
            return;
        }
        let entries = [(key, id.to_string())];
        if let Err(e) = self.store.hash_set_many(&self.hash_key, &entries).await {
            self.unavailable("set", &e);
        }
    }

    /// 批量写入，返回写入的条目数（失败时为 0）
    pub async fn set_many(&self, entries: &HashMap<String, DownstreamId>) -> usize {
        let normalized: Vec<(String, String)> = entries
            .iter()
            .map(|(code, id)| (canonicalize(code), id.to_string()))
            .filter(|(code, _)| !code.is_empty())
            .collect();
        if normalized.is_empty() {
            return 0;
        }

        if let Err(e) = self.store.hash_set_many(&self.hash_key, &normalized).await {
            self.unavailable("set_many", &e);
            return 0;
        }
        if let Some(ttl) = self.ttl {
            if let Err(e) = self.store.expire(&self.hash_key, ttl).await {
                self.unavailable("expire", &e);
            }
        }
        normalized.len()
    }

    /// 预热：批量装载并标记为已预热
    pub async fn warmup(&self, entries: &HashMap<String, DownstreamId>) -> usize {
        let loaded = self.set_many(entries).await;
        let marker = Utc::now().to_rfc3339();
        if let Err(e) = self.store.set(&self.warm_key, &marker, self.ttl).await {
            self.unavailable("warmup", &e);
        }
        self.warmed.store(true, Ordering::SeqCst);
        info!(requested = entries.len(), loaded, "Code cache warmed");
        loaded
    }

    /// 是否已预热（本进程或其他共享同一后端的进程）
    pub async fn is_warmed(&self) -> bool {
        if self.warmed.load(Ordering::SeqCst) {
            return true;
        }
        match self.store.exists(&self.warm_key).await {
            Ok(exists) => exists,
            Err(e) => {
                self.unavailable("is_warmed", &e);
                false
            }
        }
    }

    /// 条目数
    pub async fn count(&self) -> u64 {
        match self.store.hash_len(&self.hash_key).await {
            Ok(n) => n,
            Err(e) => {
                self.unavailable("count", &e);
                0
            }
        }
    }

    /// 清空缓存和预热标记
    pub async fn clear(&self) {
        self.warmed.store(false, Ordering::SeqCst);
        for key in [&self.hash_key, &self.warm_key] {
            if let Err(e) = self.store.delete(key).await {
                self.unavailable("clear", &e);
            }
        }
        info!(key = %self.hash_key, "Code cache cleared");
    }

    /// 诊断状态
    pub async fn status(&self) -> CacheStatus {
        if let Err(e) = self.store.ping().await {
            self.unavailable("status", &e);
            return CacheStatus {
                healthy: false,
                count: 0,
                warmed: self.warmed.load(Ordering::SeqCst),
                message: format!("缓存后端不可用: {}", e),
            };
        }

        let count = self.count().await;
        let warmed = self.is_warmed().await;
        let message = if warmed {
            format!("{} entries, warmed", count)
        } else {
            format!("{} entries, not warmed", count)
        };
        CacheStatus {
            healthy: true,
            count,
            warmed,
            message,
        }
    }
}
