//! 健康检查模块
//!
//! 提供 /health、/ready 和 /metrics 端点，业务路由通过 [`HealthServer::merge`] 挂载

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use stockbridge_common::{HealthCheck, check_with_timeout};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::metrics::MetricsRecorder;

/// 单个组件检查的超时
const CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// 健康检查状态
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub checks: Vec<ComponentHealth>,
}

/// 组件健康状态
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            checks: vec![],
        }
    }

    pub fn add_check(&mut self, check: ComponentHealth) {
        if check.status != "healthy" {
            self.status = "unhealthy".to_string();
        }
        self.checks.push(check);
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>, latency_ms: Option<u64>) -> Self {
        Self {
            name: name.into(),
            status: "healthy".to_string(),
            latency_ms,
            message: None,
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "unhealthy".to_string(),
            latency_ms: None,
            message: Some(message.into()),
        }
    }
}

/// 健康检查器
#[derive(Default)]
pub struct HealthChecker {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthChecker {
    pub fn new(checks: Vec<Arc<dyn HealthCheck>>) -> Self {
        Self { checks }
    }

    pub fn with_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// 执行存活检查（liveness）
    ///
    /// 只检查服务是否在运行，不检查依赖
    pub async fn liveness(&self) -> HealthStatus {
        HealthStatus::healthy()
    }

    /// 执行就绪检查（readiness）
    pub async fn readiness(&self) -> HealthStatus {
        let mut status = HealthStatus::healthy();
        for check in &self.checks {
            let result = check_with_timeout(check.as_ref(), CHECK_TIMEOUT).await;
            let component = if result.healthy {
                ComponentHealth::healthy(check.component_name(), result.latency_ms)
            } else {
                ComponentHealth::unhealthy(
                    check.component_name(),
                    result.error.unwrap_or_else(|| "unknown".to_string()),
                )
            };
            status.add_check(component);
        }
        status
    }
}

// ============================================================================
// HTTP 健康检查服务器
// ============================================================================

#[derive(Clone)]
struct HealthServerState {
    checker: Arc<HealthChecker>,
    metrics: Arc<MetricsRecorder>,
}

/// HTTP 健康检查服务器
pub struct HealthServer {
    checker: Arc<HealthChecker>,
    metrics: Arc<MetricsRecorder>,
    addr: SocketAddr,
    extra: Router,
}

impl HealthServer {
    pub fn new(checker: Arc<HealthChecker>, metrics: Arc<MetricsRecorder>, addr: SocketAddr) -> Self {
        Self {
            checker,
            metrics,
            addr,
            extra: Router::new(),
        }
    }

    /// 合并业务路由
    pub fn merge(mut self, routes: Router) -> Self {
        self.extra = self.extra.merge(routes);
        self
    }

    fn router(checker: Arc<HealthChecker>, metrics: Arc<MetricsRecorder>, extra: Router) -> Router {
        let state = HealthServerState { checker, metrics };
        Router::new()
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .merge(extra)
    }

    /// 启动 HTTP 服务器，令牌取消后优雅退出
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), std::io::Error> {
        let app = Self::router(self.checker, self.metrics, self.extra);

        info!(addr = %self.addr, "Health check HTTP server starting");

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}

/// Liveness 端点处理器
async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let status = state.checker.liveness().await;
    (StatusCode::OK, Json(status))
}

/// Readiness 端点处理器
async fn ready_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let status = state.checker.readiness().await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

/// Metrics 端点处理器
async fn metrics_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let metrics = state.metrics.render();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}
