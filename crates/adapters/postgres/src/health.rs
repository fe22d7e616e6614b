//! PostgreSQL 健康检查

use std::time::Instant;

use async_trait::async_trait;
use sqlx::PgPool;
use stockbridge_common::{BaseHealthResult, HealthCheck};
use tracing::{debug, warn};

use crate::connection::ping;

/// PostgreSQL 健康检查器
pub struct PostgresHealthCheck {
    pool: PgPool,
}

impl PostgresHealthCheck {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthCheck for PostgresHealthCheck {
    async fn check(&self) -> BaseHealthResult {
        let start = Instant::now();
        match ping(&self.pool).await {
            Ok(()) => {
                let latency = start.elapsed().as_millis() as u64;
                debug!(
                    latency_ms = latency,
                    pool_size = self.pool.size(),
                    idle = self.pool.num_idle(),
                    "PostgreSQL health check passed"
                );
                BaseHealthResult::healthy(latency)
            }
            Err(e) => {
                warn!(error = %e, "PostgreSQL health check failed");
                BaseHealthResult::unhealthy(e.to_string())
            }
        }
    }

    fn component_name(&self) -> &'static str {
        "postgres"
    }
}
