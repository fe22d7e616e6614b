//! 同步处理器
//!
//! 把上游变化的产品送入版本决策，再把待同步的映射交给批处理。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use stockbridge_errors::{AppError, AppResult};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::batch::{BatchItemReport, BatchRunner, BatchSummary};
use crate::domain::entities::{ProductMapping, SourceProduct};
use crate::domain::enums::MappingStatus;
use crate::domain::gateways::SourceGateway;
use crate::domain::repositories::MappingRepository;
use crate::domain::services::{VersionDecision, VersioningPolicy};

pub struct SyncHandler {
    source: Arc<dyn SourceGateway>,
    repository: Arc<dyn MappingRepository>,
    policy: VersioningPolicy,
    batch: BatchRunner,
    queue_limit: u32,
}

impl SyncHandler {
    pub fn new(
        source: Arc<dyn SourceGateway>,
        repository: Arc<dyn MappingRepository>,
        policy: VersioningPolicy,
        batch: BatchRunner,
    ) -> Self {
        Self {
            source,
            repository,
            policy,
            batch,
            queue_limit: 10_000,
        }
    }

    /// 单次批处理最多取出的映射数
    pub fn with_queue_limit(mut self, limit: u32) -> Self {
        self.queue_limit = limit.max(1);
        self
    }

    /// 登记一个上游产品，返回版本决策
    ///
    /// 新版本在这里落库（状态为 Pending），真正写下游由批处理完成
    pub async fn register_product(&self, product: SourceProduct) -> AppResult<VersionDecision> {
        let active = self.repository.find_active(product.id()).await?;
        let decision = self.policy.decide(product, active);
        match &decision {
            VersionDecision::Unchanged(_) => {}
            VersionDecision::CreateFirst(mapping) => {
                self.repository.insert_first(mapping).await?;
            }
            VersionDecision::CreateNext { previous, next } => {
                self.repository.supersede_and_append(previous, next).await?;
                info!(
                    source_id = %next.source_id(),
                    previous_version = previous.version(),
                    version = next.version(),
                    code = %next.canonical_versioned_code(),
                    "Product changed, new version appended"
                );
            }
        }
        Ok(decision)
    }

    /// 拉取上游变化并同步
    ///
    /// 未变化的产品计为 skipped；登记失败的产品计为 failed
    pub async fn sync_changed_products(
        &self,
        since: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> AppResult<BatchSummary> {
        Self::ensure_not_cancelled(cancel)?;
        let started = Instant::now();
        let products = self.source.fetch_changed_products(since).await?;
        info!(count = products.len(), since = ?since, "Fetched changed products");

        let mut items = Vec::new();
        for product in products {
            let source_id = product.id().clone();
            let raw_code = product.base_code().to_string();
            if cancel.is_cancelled() {
                items.push(BatchItemReport::skipped(source_id, raw_code, "cancelled before registration"));
                continue;
            }
            match self.register_product(product).await {
                Ok(VersionDecision::Unchanged(mapping)) => items.push(BatchItemReport::skipped(
                    source_id,
                    mapping.canonical_versioned_code().as_str(),
                    "unchanged",
                )),
                Ok(_) => {}
                Err(e) => {
                    warn!(source_id = %source_id, error = %e, "Failed to register product");
                    items.push(BatchItemReport::failed(source_id, raw_code, e.to_string()));
                }
            }
        }

        let registration = BatchSummary::from_items(items, cancel.is_cancelled(), started.elapsed());
        let synced = self.sync_pending(cancel).await?;
        Ok(registration.merge(synced))
    }

    /// 同步所有待处理映射
    pub async fn sync_pending(&self, cancel: &CancellationToken) -> AppResult<BatchSummary> {
        let pending = self
            .repository
            .find_by_status(MappingStatus::Pending, self.queue_limit)
            .await?;
        Ok(self.batch.run(pending, cancel).await)
    }

    /// 重试失败的映射（同一版本，不分配新版本号）
    pub async fn retry_failed(&self, cancel: &CancellationToken) -> AppResult<BatchSummary> {
        let failed = self
            .repository
            .find_by_status(MappingStatus::Failed, self.queue_limit)
            .await?;
        let requeued: Vec<ProductMapping> = failed
            .into_iter()
            .map(|mut mapping| {
                mapping.requeue();
                mapping
            })
            .collect();
        info!(count = requeued.len(), "Retrying failed mappings");
        Ok(self.batch.run(requeued, cancel).await)
    }

    /// 取消信号已触发时返回错误
    pub fn ensure_not_cancelled(cancel: &CancellationToken) -> AppResult<()> {
        if cancel.is_cancelled() {
            return Err(AppError::cancelled("同步已取消"));
        }
        Ok(())
    }
}
