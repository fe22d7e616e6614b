//! catalog-sync 服务入口

use std::sync::Arc;

use catalog_sync::api;
use catalog_sync::config::SyncSettings;
use catalog_sync::infrastructure::cache::MemoryCacheStore;
use catalog_sync::infrastructure::katana::KatanaClient;
use catalog_sync::infrastructure::koza::KozaClient;
use catalog_sync::infrastructure::persistence::{PostgresMappingRepository, migrations};
use catalog_sync::service::CatalogSync;
use stockbridge_adapter_postgres::MigrationManager;
use stockbridge_bootstrap::{Infrastructure, ServiceParts, run_service};
use stockbridge_adapter_redis::RedisDistributedLock;
use stockbridge_errors::AppError;
use stockbridge_ports::{CachePort, DistributedLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    run_service("config", |infra: Infrastructure, shutdown: CancellationToken| async move {
        info!("Initializing catalog sync service...");

        let settings = SyncSettings::from_config(infra.config())?;
        let pool = infra.postgres_pool();

        let applied = MigrationManager::new(pool.clone())
            .migrate(&migrations())
            .await?;
        info!(applied = applied.applied_count(), "Migrations applied");

        // 只有共享 Redis 时才可能多副本运行，此时编码锁也放在 Redis 上
        let (store, code_lock): (Arc<dyn CachePort>, Option<Arc<dyn DistributedLock>>) =
            match infra.redis_cache() {
                Some(redis) => {
                    let lock = RedisDistributedLock::new(redis.connection())
                        .with_prefix(settings.code_lock.key_prefix.clone());
                    (Arc::new(redis), Some(Arc::new(lock)))
                }
                None => (Arc::new(MemoryCacheStore::new()), None),
            };
        let repository = Arc::new(PostgresMappingRepository::new(pool));
        let source = Arc::new(KatanaClient::new(settings.katana.clone(), settings.retry.clone())?);
        let downstream = Arc::new(KozaClient::new(settings.koza.clone())?);

        let sync = CatalogSync::build(&settings, store, repository, source, downstream, code_lock);
        let routes = api::router(sync.diagnostics());
        let cache_health = sync.cache_health();

        let CatalogSync {
            warmup, scheduler, ..
        } = sync;
        let warmup_on_start = settings.warmup_on_start;
        let worker = tokio::spawn(async move {
            if warmup_on_start {
                let report = warmup.run(&shutdown).await;
                info!(
                    loaded = report.loaded,
                    pages = report.pages,
                    complete = report.stop.is_complete(),
                    "Startup warmup finished"
                );
            }
            scheduler.run(shutdown).await;
        });

        Ok::<_, AppError>(
            ServiceParts::new()
                .with_routes(routes)
                .with_health_check(cache_health)
                .with_task(worker),
        )
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))
}
