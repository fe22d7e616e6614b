//! 缓存预热
//!
//! 分页列出下游全部库存卡片装入编码缓存。下游可能挂起或无限返回同一页，
//! 所以整体受超时、最大页数和重复页检测约束；中途停止时已取到的部分照样装载。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use stockbridge_common::types::Pagination;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::invoker::{DownstreamInvoker, InvokeError};
use crate::domain::gateways::DownstreamRecord;
use crate::domain::value_objects::{DownstreamId, canonicalize};
use crate::infrastructure::cache::CodeCache;

#[derive(Debug, Clone)]
pub struct WarmupSettings {
    pub page_size: u32,
    pub timeout: Duration,
    pub max_pages: u32,
}

impl Default for WarmupSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            timeout: Duration::from_secs(120),
            max_pages: 500,
        }
    }
}

/// 预热停止原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum WarmupStop {
    /// 列表取完
    Exhausted,
    /// 达到最大页数
    MaxPages,
    /// 下游返回了与上一页相同的数据
    RepeatedPage,
    /// 整体超时
    Timeout,
    Cancelled,
    Failed(String),
}

impl WarmupStop {
    /// 是否完整遍历了下游列表
    ///
    /// 达到最大页数时列表可能还有剩余，按部分结果处理
    pub fn is_complete(&self) -> bool {
        matches!(self, WarmupStop::Exhausted | WarmupStop::RepeatedPage)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupReport {
    pub pages: u32,
    pub records: usize,
    pub loaded: usize,
    pub stop: WarmupStop,
    pub duration_ms: u64,
}

pub struct WarmupService {
    invoker: Arc<DownstreamInvoker>,
    cache: Arc<CodeCache>,
    settings: WarmupSettings,
}

impl WarmupService {
    pub fn new(invoker: Arc<DownstreamInvoker>, cache: Arc<CodeCache>, settings: WarmupSettings) -> Self {
        Self {
            invoker,
            cache,
            settings,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> WarmupReport {
        let started = Instant::now();
        let mut entries: HashMap<String, DownstreamId> = HashMap::new();
        let mut pages = 0u32;
        let mut records = 0usize;

        let stop = {
            let collect = self.collect(&mut entries, &mut pages, &mut records, cancel);
            match tokio::time::timeout(self.settings.timeout, collect).await {
                Ok(stop) => stop,
                Err(_) => WarmupStop::Timeout,
            }
        };

        let loaded = if stop.is_complete() {
            self.cache.warmup(&entries).await
        } else {
            // 部分结果也装载，但不标记为已预热
            self.cache.set_many(&entries).await
        };

        let report = WarmupReport {
            pages,
            records,
            loaded,
            stop,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        if report.stop.is_complete() {
            info!(
                pages = report.pages,
                records = report.records,
                loaded = report.loaded,
                stop = ?report.stop,
                duration_ms = report.duration_ms,
                "Cache warmup finished"
            );
        } else {
            warn!(
                pages = report.pages,
                records = report.records,
                loaded = report.loaded,
                stop = ?report.stop,
                duration_ms = report.duration_ms,
                "Cache warmup stopped early, partial results loaded"
            );
        }
        report
    }

    async fn collect(
        &self,
        entries: &mut HashMap<String, DownstreamId>,
        pages: &mut u32,
        records: &mut usize,
        cancel: &CancellationToken,
    ) -> WarmupStop {
        let mut page = Pagination::new(1, self.settings.page_size);
        let mut previous: Option<Vec<DownstreamRecord>> = None;

        loop {
            if *pages >= self.settings.max_pages {
                return WarmupStop::MaxPages;
            }

            let result = self
                .invoker
                .call("list", cancel, |gateway, token| async move {
                    gateway.list_page(&token, page).await
                })
                .await;

            let rows = match result {
                Ok(rows) => rows,
                Err(InvokeError::Cancelled) => return WarmupStop::Cancelled,
                Err(InvokeError::Downstream(e)) => return WarmupStop::Failed(e.to_string()),
            };

            if rows.is_empty() {
                return WarmupStop::Exhausted;
            }
            if previous.as_ref() == Some(&rows) {
                return WarmupStop::RepeatedPage;
            }

            *pages += 1;
            *records += rows.len();
            for row in &rows {
                let code = canonicalize(&row.code);
                if !code.is_empty() {
                    entries.insert(code, row.id);
                }
            }

            if page.is_last_page(rows.len()) {
                return WarmupStop::Exhausted;
            }
            previous = Some(rows);
            page = page.next();
        }
    }
}
