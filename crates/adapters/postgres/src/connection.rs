//! PostgreSQL 连接池

use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, Secret};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use stockbridge_errors::{AppError, AppResult};

/// 连接池参数
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: Secret<String>,
    /// 出现在 `pg_stat_activity` 中的客户端名称
    pub application_name: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl PostgresConfig {
    pub fn new(url: Secret<String>, application_name: impl Into<String>) -> Self {
        Self {
            url,
            application_name: application_name.into(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }

    /// 建立连接池，连接串错误不会暴露密码
    pub async fn connect(&self) -> AppResult<PgPool> {
        let options = PgConnectOptions::from_str(self.url.expose_secret())
            .map_err(|_| AppError::validation("数据库连接串格式错误"))?
            .application_name(&self.application_name);

        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to create pool: {}", e)))
    }
}

/// `SELECT 1` 往返
pub async fn ping(pool: &PgPool) -> AppResult<()> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| ())
        .map_err(|e| AppError::database(format!("Database ping failed: {}", e)))
}
