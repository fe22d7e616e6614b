//! Redis 健康检查

use std::time::Instant;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use stockbridge_common::{BaseHealthResult, HealthCheck};
use tracing::{debug, warn};

use crate::connection::ping;

/// Redis 健康检查器
pub struct RedisHealthCheck {
    conn: ConnectionManager,
}

impl RedisHealthCheck {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl HealthCheck for RedisHealthCheck {
    async fn check(&self) -> BaseHealthResult {
        let start = Instant::now();
        let mut conn = self.conn.clone();
        match ping(&mut conn).await {
            Ok(()) => {
                let latency = start.elapsed().as_millis() as u64;
                debug!(latency_ms = latency, "Redis health check passed");
                BaseHealthResult::healthy(latency)
            }
            Err(e) => {
                warn!(error = %e, "Redis health check failed");
                BaseHealthResult::unhealthy(e.to_string())
            }
        }
    }

    fn component_name(&self) -> &'static str {
        "redis"
    }
}
