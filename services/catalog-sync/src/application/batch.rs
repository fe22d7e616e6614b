//! 批量同步
//!
//! 固定数量的 worker 从共享队列里取映射。每个 worker 在发起创建请求后随机等待一段时间，
//! 避免触发下游的限流。单条失败不影响其他条目。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use stockbridge_common::retry::{random_delay, sleep_or_cancel};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::upsert::{UpsertOrchestrator, UpsertOutcome, UpsertStatus};
use crate::domain::entities::ProductMapping;
use crate::domain::value_objects::{DownstreamId, SourceProductId};
use crate::metrics;

/// 批处理参数
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub workers: usize,
    pub rate_limit_min: Duration,
    pub rate_limit_max: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            rate_limit_min: Duration::from_millis(350),
            rate_limit_max: Duration::from_millis(1000),
        }
    }
}

/// 单条结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Synced,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemReport {
    pub source_id: SourceProductId,
    pub code: String,
    pub version: Option<u32>,
    pub status: ItemStatus,
    pub downstream_id: Option<DownstreamId>,
    pub message: Option<String>,
}

impl BatchItemReport {
    pub fn skipped(source_id: SourceProductId, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_id,
            code: code.into(),
            version: None,
            status: ItemStatus::Skipped,
            downstream_id: None,
            message: Some(message.into()),
        }
    }

    pub fn failed(source_id: SourceProductId, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_id,
            code: code.into(),
            version: None,
            status: ItemStatus::Failed,
            downstream_id: None,
            message: Some(message.into()),
        }
    }

    fn from_outcome(outcome: UpsertOutcome) -> Self {
        let (status, message) = match outcome.status {
            UpsertStatus::Synced => (ItemStatus::Synced, None),
            UpsertStatus::Failed => (ItemStatus::Failed, outcome.error),
            UpsertStatus::Cancelled => (ItemStatus::Skipped, Some("cancelled".to_string())),
        };
        Self {
            source_id: outcome.source_id,
            code: outcome.code.into_string(),
            version: Some(outcome.version),
            status,
            downstream_id: outcome.downstream_id,
            message,
        }
    }

    fn not_processed(mapping: &ProductMapping, cancelled: bool) -> Self {
        let report = if cancelled {
            Self::skipped(
                mapping.source_id().clone(),
                mapping.canonical_versioned_code().as_str(),
                "cancelled before processing",
            )
        } else {
            Self::failed(
                mapping.source_id().clone(),
                mapping.canonical_versioned_code().as_str(),
                "not processed",
            )
        };
        Self {
            version: Some(mapping.version()),
            ..report
        }
    }
}

/// 批次汇总
///
/// 计数总是由条目推导，`success + failed + skipped == total`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_count: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
    pub items: Vec<BatchItemReport>,
}

impl BatchSummary {
    pub fn from_items(items: Vec<BatchItemReport>, cancelled: bool, duration: Duration) -> Self {
        let count = |s: ItemStatus| items.iter().filter(|i| i.status == s).count();
        Self {
            total_count: items.len(),
            success_count: count(ItemStatus::Synced),
            failed_count: count(ItemStatus::Failed),
            skipped_count: count(ItemStatus::Skipped),
            cancelled,
            duration_ms: duration.as_millis() as u64,
            items,
        }
    }

    /// 追加另一批的条目，计数重新推导
    pub fn merge(self, other: BatchSummary) -> Self {
        let cancelled = self.cancelled || other.cancelled;
        let duration = Duration::from_millis(self.duration_ms + other.duration_ms);
        let mut items = self.items;
        items.extend(other.items);
        Self::from_items(items, cancelled, duration)
    }
}

/// 批处理执行器
pub struct BatchRunner {
    orchestrator: Arc<UpsertOrchestrator>,
    settings: BatchSettings,
}

impl BatchRunner {
    pub fn new(orchestrator: Arc<UpsertOrchestrator>, settings: BatchSettings) -> Self {
        Self {
            orchestrator,
            settings,
        }
    }

    /// 处理一批映射，按输入顺序返回每条结果
    pub async fn run(&self, mappings: Vec<ProductMapping>, cancel: &CancellationToken) -> BatchSummary {
        let started = Instant::now();
        let total = mappings.len();
        if total == 0 {
            return BatchSummary::default();
        }

        let placeholders: Vec<BatchItemReport> = mappings
            .iter()
            .map(|m| BatchItemReport::not_processed(m, true))
            .collect();
        let fallback: Vec<BatchItemReport> = mappings
            .iter()
            .map(|m| BatchItemReport::not_processed(m, false))
            .collect();

        let queue: Mutex<VecDeque<(usize, ProductMapping)>> =
            Mutex::new(mappings.into_iter().enumerate().collect());
        let slots: Mutex<Vec<Option<BatchItemReport>>> = Mutex::new(vec![None; total]);

        let workers = self.settings.workers.clamp(1, total);
        info!(total, workers, "Batch started");

        let worker_futures = (0..workers).map(|worker| self.worker(worker, &queue, &slots, cancel));
        futures::future::join_all(worker_futures).await;

        let cancelled = cancel.is_cancelled();
        let items: Vec<BatchItemReport> = slots
            .into_inner()
            .into_iter()
            .zip(placeholders.into_iter().zip(fallback))
            .map(|(slot, (skipped, failed))| {
                slot.unwrap_or(if cancelled { skipped } else { failed })
            })
            .collect();

        let summary = BatchSummary::from_items(items, cancelled, started.elapsed());
        metrics::record_batch_duration(summary.duration_ms as f64);
        info!(
            total = summary.total_count,
            success = summary.success_count,
            failed = summary.failed_count,
            skipped = summary.skipped_count,
            cancelled = summary.cancelled,
            duration_ms = summary.duration_ms,
            "Batch finished"
        );
        summary
    }

    async fn worker(
        &self,
        worker: usize,
        queue: &Mutex<VecDeque<(usize, ProductMapping)>>,
        slots: &Mutex<Vec<Option<BatchItemReport>>>,
        cancel: &CancellationToken,
    ) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let Some((index, mapping)) = queue.lock().pop_front() else {
                break;
            };

            let outcome = self.orchestrator.upsert(mapping, cancel).await;
            let create_called = outcome.create_called;
            slots.lock()[index] = Some(BatchItemReport::from_outcome(outcome));

            if create_called {
                let delay = random_delay(self.settings.rate_limit_min, self.settings.rate_limit_max);
                debug!(worker, delay_ms = delay.as_millis() as u64, "Rate limit pause");
                if !sleep_or_cancel(delay, cancel).await {
                    break;
                }
            }
        }
    }
}
