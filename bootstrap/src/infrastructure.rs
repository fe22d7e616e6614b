//! 基础设施资源管理
//!
//! PostgreSQL 为必需依赖，Redis 可选

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use sqlx::PgPool;
use stockbridge_adapter_postgres::{PostgresConfig, PostgresHealthCheck};
use stockbridge_adapter_redis::{RedisCache, RedisHealthCheck, connect};
use stockbridge_common::{HealthCheck, RetryConfig, with_retry, with_retry_optional};
use stockbridge_config::AppConfig;
use stockbridge_errors::AppResult;
use tracing::{info, warn};

/// 基础设施资源容器
#[derive(Clone)]
pub struct Infrastructure {
    config: AppConfig,
    postgres_pool: PgPool,
    redis_conn: Option<ConnectionManager>,
}

impl Infrastructure {
    /// 从配置创建基础设施资源（带重试）
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        let retry_config = RetryConfig::new(5, Duration::from_millis(500), Duration::from_secs(10));

        let pg_config = PostgresConfig::new(config.database.url.clone(), config.app_name.clone())
            .with_max_connections(config.database.max_connections);
        let postgres_pool =
            with_retry(&retry_config, "PostgreSQL connection", || pg_config.connect()).await?;
        info!(
            max_connections = config.database.max_connections,
            "PostgreSQL connection pool created"
        );

        // Redis 不可用时退化为进程内缓存，不阻止启动
        let redis_conn = match &config.redis {
            Some(redis) => {
                let conn =
                    with_retry_optional(&retry_config, "Redis connection", || connect(&redis.url))
                        .await;
                match &conn {
                    Some(_) => info!("Redis connection manager created"),
                    None => warn!("Redis unavailable, falling back to in-process cache"),
                }
                conn
            }
            None => {
                info!("Redis not configured, using in-process cache");
                None
            }
        };

        Ok(Self {
            config,
            postgres_pool,
            redis_conn,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn postgres_pool(&self) -> PgPool {
        self.postgres_pool.clone()
    }

    pub fn has_redis(&self) -> bool {
        self.redis_conn.is_some()
    }

    /// 基于共享连接的 Redis 缓存
    pub fn redis_cache(&self) -> Option<RedisCache> {
        self.redis_conn.clone().map(RedisCache::new)
    }

    /// 就绪检查需要覆盖的组件
    pub fn health_checks(&self) -> Vec<Arc<dyn HealthCheck>> {
        let mut checks: Vec<Arc<dyn HealthCheck>> =
            vec![Arc::new(PostgresHealthCheck::new(self.postgres_pool()))];
        if let Some(conn) = &self.redis_conn {
            checks.push(Arc::new(RedisHealthCheck::new(conn.clone())));
        }
        checks
    }
}
