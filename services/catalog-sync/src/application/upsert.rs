//! Upsert 编排
//!
//! 缓存命中直接成功；未命中时在编码锁内重新查缓存、查下游、必要时创建。
//! 这里是唯一写下游的地方，也是唯一决定映射最终状态的地方。

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use stockbridge_errors::AppError;
use stockbridge_ports::DistributedLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::code_locks::{CodeLocks, LockWaitError, RemoteLockSettings};
use crate::application::invoker::{DownstreamInvoker, InvokeError};
use crate::domain::entities::ProductMapping;
use crate::domain::gateways::{DownstreamError, PayloadDefaults, StockCardPayload};
use crate::domain::repositories::MappingRepository;
use crate::domain::value_objects::{CanonicalCode, DownstreamId, SourceProductId};
use crate::infrastructure::cache::CodeCache;
use crate::metrics;

/// Upsert 结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpsertStatus {
    Synced,
    Failed,
    /// 被取消，映射保持原状态
    Cancelled,
}

impl UpsertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertStatus::Synced => "synced",
            UpsertStatus::Failed => "failed",
            UpsertStatus::Cancelled => "cancelled",
        }
    }
}

/// 成功的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncedVia {
    Cache,
    Lookup,
    Created,
    Conflict,
}

/// Upsert 结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOutcome {
    pub source_id: SourceProductId,
    pub code: CanonicalCode,
    pub version: u32,
    pub status: UpsertStatus,
    pub downstream_id: Option<DownstreamId>,
    pub via: Option<SyncedVia>,
    pub error: Option<String>,
    /// 是否向下游发起过创建请求（批处理据此限速）
    pub create_called: bool,
}

enum Resolution {
    Synced(Option<DownstreamId>, SyncedVia),
    Failed(String),
    Cancelled,
}

/// Upsert 编排器
pub struct UpsertOrchestrator {
    cache: Arc<CodeCache>,
    invoker: Arc<DownstreamInvoker>,
    repository: Arc<dyn MappingRepository>,
    locks: CodeLocks,
    defaults: PayloadDefaults,
}

impl UpsertOrchestrator {
    pub fn new(
        cache: Arc<CodeCache>,
        invoker: Arc<DownstreamInvoker>,
        repository: Arc<dyn MappingRepository>,
        defaults: PayloadDefaults,
    ) -> Self {
        Self {
            cache,
            invoker,
            repository,
            locks: CodeLocks::new(),
            defaults,
        }
    }

    /// 多副本部署时，编码锁同时在共享后端上互斥
    pub fn with_distributed_lock(
        mut self,
        backend: Arc<dyn DistributedLock>,
        settings: RemoteLockSettings,
    ) -> Self {
        self.locks = CodeLocks::new().with_remote(backend, settings);
        self
    }

    /// 同步一条映射到下游并持久化结果
    pub async fn upsert(&self, mut mapping: ProductMapping, cancel: &CancellationToken) -> UpsertOutcome {
        let code = CanonicalCode::new(mapping.canonical_versioned_code().as_str());
        let mut create_called = false;

        let resolution = if cancel.is_cancelled() {
            Resolution::Cancelled
        } else if code.is_empty() {
            Resolution::Failed("产品编码为空".to_string())
        } else {
            self.resolve(&mapping, &code, cancel, &mut create_called).await
        };

        let mut outcome = UpsertOutcome {
            source_id: mapping.source_id().clone(),
            code: code.clone(),
            version: mapping.version(),
            status: UpsertStatus::Cancelled,
            downstream_id: None,
            via: None,
            error: None,
            create_called,
        };

        match resolution {
            Resolution::Synced(id, via) => {
                mapping.mark_synced(id);
                outcome.status = UpsertStatus::Synced;
                outcome.downstream_id = mapping.downstream_id();
                outcome.via = Some(via);
                info!(
                    source_id = %outcome.source_id,
                    code = %code,
                    version = outcome.version,
                    downstream_id = ?outcome.downstream_id,
                    via = ?via,
                    "Mapping synced"
                );
                if let Err(e) = self.repository.save_outcome(&mapping).await {
                    self.persist_failed(&mut outcome, e);
                }
            }
            Resolution::Failed(message) => {
                mapping.mark_failed(message.clone());
                outcome.status = UpsertStatus::Failed;
                outcome.error = Some(message);
                warn!(
                    source_id = %outcome.source_id,
                    code = %code,
                    version = outcome.version,
                    error = outcome.error.as_deref().unwrap_or_default(),
                    "Mapping sync failed"
                );
                if let Err(e) = self.repository.save_outcome(&mapping).await {
                    self.persist_failed(&mut outcome, e);
                }
            }
            Resolution::Cancelled => {
                debug!(source_id = %outcome.source_id, code = %code, "Upsert cancelled");
            }
        }

        metrics::record_upsert(outcome.status.as_str());
        outcome
    }

    fn persist_failed(&self, outcome: &mut UpsertOutcome, e: AppError) {
        error!(
            source_id = %outcome.source_id,
            code = %outcome.code,
            error = %e,
            "Failed to persist mapping outcome"
        );
        outcome.status = UpsertStatus::Failed;
        outcome.error = Some(format!("保存映射状态失败: {}", e));
    }

    async fn resolve(
        &self,
        mapping: &ProductMapping,
        code: &CanonicalCode,
        cancel: &CancellationToken,
        create_called: &mut bool,
    ) -> Resolution {
        if let Some(id) = self.cache.get(code.as_str()).await {
            return Resolution::Synced(Some(id), SyncedVia::Cache);
        }

        let guard = match self.locks.lock(code.as_str(), cancel).await {
            Ok(guard) => guard,
            Err(LockWaitError::Cancelled) => return Resolution::Cancelled,
            Err(LockWaitError::Timeout) => return Resolution::Failed("等待编码锁超时".to_string()),
        };
        let resolution = self.resolve_locked(mapping, code, cancel, create_called).await;
        guard.release().await;
        resolution
    }

    async fn resolve_locked(
        &self,
        mapping: &ProductMapping,
        code: &CanonicalCode,
        cancel: &CancellationToken,
        create_called: &mut bool,
    ) -> Resolution {
        // 等锁期间可能已有其他 worker 或副本完成了同一编码
        if let Some(id) = self.cache.get(code.as_str()).await {
            return Resolution::Synced(Some(id), SyncedVia::Cache);
        }

        let lookup = self
            .invoker
            .call("find", cancel, |gateway, token| {
                let code = code.clone();
                async move { gateway.find_by_code(&token, &code).await }
            })
            .await;

        let found = match lookup {
            Ok(Some(id)) => Resolution::Synced(Some(id), SyncedVia::Lookup),
            Ok(None) => return self.create(mapping, code, cancel, create_called).await,
            Err(e) => Self::classify(e),
        };
        self.remember(code, found).await
    }

    async fn create(
        &self,
        mapping: &ProductMapping,
        code: &CanonicalCode,
        cancel: &CancellationToken,
        create_called: &mut bool,
    ) -> Resolution {
        let mut payload =
            StockCardPayload::from_mapping(mapping, &self.defaults, Utc::now().date_naive());
        payload.kart_kodu = code.as_str().to_string();

        *create_called = true;
        let created = self
            .invoker
            .call("create", cancel, |gateway, token| {
                let payload = payload.clone();
                async move { gateway.create(&token, &payload).await }
            })
            .await;

        let resolution = match created {
            Ok(id) => {
                if id.is_none() {
                    warn!(code = %code, "Create succeeded without returning an id");
                }
                Resolution::Synced(id, SyncedVia::Created)
            }
            Err(InvokeError::Downstream(DownstreamError::Conflict {
                existing_id: None,
                message,
            })) => {
                info!(code = %code, message = %message, "Duplicate code without id, looking it up");
                self.lookup_conflicting(code, cancel).await
            }
            Err(e) => Self::classify(e),
        };
        self.remember(code, resolution).await
    }

    /// 下游报重复但没带 ID 时再查一次；查不到仍按已同步处理
    async fn lookup_conflicting(&self, code: &CanonicalCode, cancel: &CancellationToken) -> Resolution {
        let lookup = self
            .invoker
            .call("find", cancel, |gateway, token| {
                let code = code.clone();
                async move { gateway.find_by_code(&token, &code).await }
            })
            .await;

        match lookup {
            Ok(Some(id)) => Resolution::Synced(Some(id), SyncedVia::Conflict),
            Ok(None) => {
                warn!(code = %code, "Duplicate code not found by lookup, id left empty");
                Resolution::Synced(None, SyncedVia::Conflict)
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Lookup after duplicate failed, id left empty");
                Resolution::Synced(None, SyncedVia::Conflict)
            }
        }
    }

    /// 仍持有编码锁时写缓存，后续等锁的 worker 重新查缓存即可命中
    async fn remember(&self, code: &CanonicalCode, resolution: Resolution) -> Resolution {
        if let Resolution::Synced(Some(id), _) = &resolution {
            self.cache.set(code.as_str(), *id).await;
        }
        resolution
    }

    fn classify(error: InvokeError) -> Resolution {
        match error {
            InvokeError::Cancelled => Resolution::Cancelled,
            InvokeError::Downstream(DownstreamError::Conflict { existing_id, message }) => {
                info!(existing_id = ?existing_id, message = %message, "Duplicate code treated as synced");
                Resolution::Synced(existing_id, SyncedVia::Conflict)
            }
            InvokeError::Downstream(e) => Resolution::Failed(e.to_string()),
        }
    }
}
