//! Metrics 模块
//!
//! 提供 Prometheus metrics 导出

use metrics_exporter_prometheus::PrometheusHandle;
use stockbridge_errors::{AppError, AppResult};
use stockbridge_telemetry::init_metrics;

/// Metrics 记录器
pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    /// 安装全局 Prometheus recorder
    pub fn install() -> AppResult<Self> {
        let handle = init_metrics()
            .map_err(|e| AppError::internal(format!("安装 Prometheus recorder 失败: {}", e)))?;
        Ok(Self { handle })
    }

    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// 获取 Prometheus 格式的 metrics
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
