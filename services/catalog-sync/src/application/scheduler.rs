//! 周期同步任务

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::batch::BatchSummary;
use crate::application::handler::SyncHandler;

pub struct SyncScheduler {
    handler: Arc<SyncHandler>,
    interval: Duration,
    retry_failed: bool,
    /// 上一次成功运行的开始时间，作为下一次的增量起点
    since: Mutex<Option<DateTime<Utc>>>,
}

impl SyncScheduler {
    pub fn new(handler: Arc<SyncHandler>, interval: Duration) -> Self {
        Self {
            handler,
            interval,
            retry_failed: false,
            since: Mutex::new(None),
        }
    }

    /// 每轮结束后重新排队失败的映射
    pub fn with_retry_failed(mut self, enabled: bool) -> Self {
        self.retry_failed = enabled;
        self
    }

    pub fn since(&self) -> Option<DateTime<Utc>> {
        *self.since.lock()
    }

    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// 按间隔循环执行，直到令牌被取消
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Sync scheduler started");
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle(&shutdown).await;
                }
                _ = shutdown.cancelled() => {
                    info!("Sync scheduler received shutdown signal");
                    break;
                }
            }
        }
        info!("Sync scheduler stopped");
    }

    /// 执行一轮同步
    ///
    /// 只有完整跑完（未取消、没有失败项）时才推进增量起点，
    /// 否则下一轮会重新拉取同一时间窗口
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Option<BatchSummary> {
        let started_at = Utc::now();
        let since = self.since();

        let summary = match self.handler.sync_changed_products(since, cancel).await {
            Ok(summary) => summary,
            Err(e) if e.is_cancelled() => {
                info!("Sync cycle cancelled before start");
                return None;
            }
            Err(e) => {
                error!(error = %e, since = ?since, "Sync cycle failed");
                return None;
            }
        };

        info!(
            total = summary.total_count,
            success = summary.success_count,
            failed = summary.failed_count,
            skipped = summary.skipped_count,
            cancelled = summary.cancelled,
            duration_ms = summary.duration_ms,
            "Sync cycle finished"
        );

        if !summary.cancelled && summary.failed_count == 0 {
            *self.since.lock() = Some(started_at);
        }

        if self.retry_failed && !cancel.is_cancelled() {
            match self.handler.retry_failed(cancel).await {
                Ok(retried) if retried.total_count > 0 => info!(
                    total = retried.total_count,
                    success = retried.success_count,
                    failed = retried.failed_count,
                    "Failed mappings retried"
                ),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Retrying failed mappings failed"),
            }
        }

        Some(summary)
    }
}
