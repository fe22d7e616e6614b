//! 组件装配

use std::sync::Arc;

use async_trait::async_trait;
use stockbridge_common::{BaseHealthResult, HealthCheck};
use stockbridge_ports::{CachePort, DistributedLock};

use crate::api::DiagnosticsState;
use crate::application::{
    BatchRunner, DownstreamInvoker, MappingQueries, SessionManager, SyncHandler, SyncScheduler,
    UpsertOrchestrator, WarmupService,
};
use crate::config::SyncSettings;
use crate::domain::gateways::{DownstreamGateway, SourceGateway};
use crate::domain::repositories::MappingRepository;
use crate::domain::services::VersioningPolicy;
use crate::infrastructure::cache::CodeCache;

/// 装配好的同步服务
pub struct CatalogSync {
    pub sessions: Arc<SessionManager>,
    pub cache: Arc<CodeCache>,
    pub invoker: Arc<DownstreamInvoker>,
    pub orchestrator: Arc<UpsertOrchestrator>,
    pub handler: Arc<SyncHandler>,
    pub warmup: WarmupService,
    pub queries: Arc<MappingQueries>,
    pub scheduler: Arc<SyncScheduler>,
}

impl CatalogSync {
    pub fn build(
        settings: &SyncSettings,
        store: Arc<dyn CachePort>,
        repository: Arc<dyn MappingRepository>,
        source: Arc<dyn SourceGateway>,
        downstream: Arc<dyn DownstreamGateway>,
        code_lock: Option<Arc<dyn DistributedLock>>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(downstream.clone(), settings.refresh_buffer));
        let cache = Arc::new(CodeCache::new(store).with_ttl(settings.cache_ttl));
        let invoker = Arc::new(DownstreamInvoker::new(
            downstream,
            sessions.clone(),
            settings.retry.clone(),
        ));
        let mut orchestrator = UpsertOrchestrator::new(
            cache.clone(),
            invoker.clone(),
            repository.clone(),
            settings.payload.clone(),
        );
        if let Some(backend) = code_lock {
            orchestrator = orchestrator.with_distributed_lock(backend, settings.code_lock.clone());
        }
        let orchestrator = Arc::new(orchestrator);
        let handler = Arc::new(SyncHandler::new(
            source,
            repository.clone(),
            VersioningPolicy::new(settings.version_suffix.clone()),
            BatchRunner::new(orchestrator.clone(), settings.batch.clone()),
        ));
        let warmup = WarmupService::new(invoker.clone(), cache.clone(), settings.warmup.clone());
        let queries = Arc::new(MappingQueries::new(repository));
        let scheduler = Arc::new(
            SyncScheduler::new(handler.clone(), settings.interval)
                .with_retry_failed(settings.retry_failed_on_interval),
        );

        Self {
            sessions,
            cache,
            invoker,
            orchestrator,
            handler,
            warmup,
            queries,
            scheduler,
        }
    }

    pub fn diagnostics(&self) -> DiagnosticsState {
        DiagnosticsState {
            sessions: self.sessions.clone(),
            cache: self.cache.clone(),
            queries: self.queries.clone(),
        }
    }

    pub fn cache_health(&self) -> Arc<dyn HealthCheck> {
        Arc::new(CodeCacheHealth {
            cache: self.cache.clone(),
        })
    }
}

/// 编码缓存就绪检查
struct CodeCacheHealth {
    cache: Arc<CodeCache>,
}

#[async_trait]
impl HealthCheck for CodeCacheHealth {
    async fn check(&self) -> BaseHealthResult {
        let status = self.cache.status().await;
        if status.healthy {
            BaseHealthResult {
                healthy: true,
                latency_ms: None,
                error: None,
            }
        } else {
            BaseHealthResult::unhealthy(status.message)
        }
    }

    fn component_name(&self) -> &'static str {
        "code_cache"
    }
}
