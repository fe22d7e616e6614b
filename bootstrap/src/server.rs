//! 服务启动器
//!
//! 提供统一的服务启动模式

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use stockbridge_common::HealthCheck;
use stockbridge_config::AppConfig;
use stockbridge_errors::AppResult;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::health::{HealthChecker, HealthServer};
use crate::infrastructure::Infrastructure;
use crate::metrics::MetricsRecorder;
use crate::runtime::{cancel_on_shutdown, init_runtime};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 服务构建结果
#[derive(Default)]
pub struct ServiceParts {
    /// 挂载到健康检查服务器上的业务路由
    pub routes: Router,
    /// 追加到 /ready 的组件检查
    pub health_checks: Vec<Arc<dyn HealthCheck>>,
    /// 后台任务，关闭时等待其结束
    pub tasks: Vec<JoinHandle<()>>,
}

impl ServiceParts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    pub fn with_health_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.health_checks.push(check);
        self
    }

    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.tasks.push(task);
        self
    }
}

/// 运行服务
///
/// 1. 加载配置并初始化日志
/// 2. 安装 Prometheus recorder
/// 3. 创建基础设施资源（带重试）
/// 4. 调用闭包构建业务组件，闭包拿到的令牌在收到关闭信号时被取消
/// 5. 启动 HTTP 服务器，关闭后等待后台任务结束
///
/// # 示例
///
/// ```ignore
/// run_service("config", |infra, shutdown| async move {
///     let worker = tokio::spawn(run_worker(infra.postgres_pool(), shutdown));
///     Ok(ServiceParts::new().with_task(worker))
/// })
/// .await
/// ```
pub async fn run_service<F, Fut>(config_dir: &str, builder: F) -> Result<(), BoxError>
where
    F: FnOnce(Infrastructure, CancellationToken) -> Fut,
    Fut: Future<Output = AppResult<ServiceParts>>,
{
    let config = AppConfig::load(config_dir)?;

    init_runtime(&config);

    info!(app_name = %config.app_name, "Starting service");

    let metrics = Arc::new(MetricsRecorder::install()?);

    let infra = Infrastructure::from_config(config.clone()).await?;

    let shutdown = CancellationToken::new();
    let signal_handle = cancel_on_shutdown(shutdown.clone());

    let parts = match builder(infra.clone(), shutdown.clone()).await {
        Ok(parts) => parts,
        Err(e) => {
            shutdown.cancel();
            return Err(e.into());
        }
    };

    let mut checks = infra.health_checks();
    checks.extend(parts.health_checks);
    let checker = Arc::new(HealthChecker::new(checks));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let server = HealthServer::new(checker, metrics, addr).merge(parts.routes);

    let served = server.serve(shutdown.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "HTTP server error");
    }
    shutdown.cancel();

    for task in parts.tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Background task panicked");
        }
    }
    signal_handle.abort();

    info!("Service stopped");

    served.map_err(Into::into)
}
