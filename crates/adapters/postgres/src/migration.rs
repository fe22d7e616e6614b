//! 内嵌 SQL 迁移
//!
//! 多个实例同时启动时通过 advisory lock 串行执行，每个版本单独一个事务

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use stockbridge_errors::{AppError, AppResult};
use tracing::{info, warn};

/// advisory lock 的键
const MIGRATION_LOCK_KEY: i64 = 0x5354_4B42_5247;

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: String,
    pub checksum: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let checksum = checksum(&sql);
        Self {
            version,
            name: name.into(),
            sql,
            checksum,
        }
    }
}

/// 首尾空白不影响校验和
fn checksum(sql: &str) -> String {
    hex::encode(Sha256::digest(sql.trim().as_bytes()))
}

/// 一次迁移运行的结果
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub applied: Vec<i64>,
    pub already_applied: Vec<i64>,
}

impl MigrationReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

pub struct MigrationManager {
    pool: PgPool,
    table: String,
}

impl MigrationManager {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table: "_migrations".to_string(),
        }
    }

    /// 按版本升序执行尚未应用的迁移
    ///
    /// 已应用版本的 SQL 被改动时直接失败
    pub async fn migrate(&self, migrations: &[Migration]) -> AppResult<MigrationReport> {
        let mut conn = self.pool.acquire().await.map_err(db_error("acquire connection"))?;

        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await
            .map_err(db_error("take migration lock"))?;

        let result = self.migrate_locked(&mut conn, migrations).await;

        if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await
        {
            warn!(error = %e, "Failed to release migration lock");
        }
        result
    }

    async fn migrate_locked(
        &self,
        conn: &mut PoolConnection<Postgres>,
        migrations: &[Migration],
    ) -> AppResult<MigrationReport> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                checksum CHAR(64) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            self.table
        ))
        .execute(&mut **conn)
        .await
        .map_err(db_error("create migration table"))?;

        let recorded: HashMap<i64, String> =
            sqlx::query_as::<_, (i64, String)>(&format!("SELECT version, checksum FROM {}", self.table))
                .fetch_all(&mut **conn)
                .await
                .map_err(db_error("read migration table"))?
                .into_iter()
                .collect();

        let mut ordered: Vec<&Migration> = migrations.iter().collect();
        ordered.sort_by_key(|m| m.version);

        let mut report = MigrationReport::default();
        for migration in ordered {
            match recorded.get(&migration.version) {
                Some(sum) if sum.trim() != migration.checksum => {
                    return Err(AppError::database(format!(
                        "迁移 {} ({}) 已应用但内容被修改",
                        migration.version, migration.name
                    )));
                }
                Some(_) => report.already_applied.push(migration.version),
                None => {
                    self.apply(conn, migration).await?;
                    report.applied.push(migration.version);
                }
            }
        }
        Ok(report)
    }

    async fn apply(&self, conn: &mut PoolConnection<Postgres>, migration: &Migration) -> AppResult<()> {
        let mut tx = sqlx::Connection::begin(&mut **conn)
            .await
            .map_err(db_error("begin migration"))?;

        sqlx::raw_sql(&migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::database(format!("Migration {} failed: {}", migration.version, e))
            })?;

        sqlx::query(&format!(
            "INSERT INTO {} (version, name, checksum) VALUES ($1, $2, $3)",
            self.table
        ))
        .bind(migration.version)
        .bind(&migration.name)
        .bind(&migration.checksum)
        .execute(&mut *tx)
        .await
        .map_err(db_error("record migration"))?;

        tx.commit().await.map_err(db_error("commit migration"))?;
        info!(version = migration.version, name = %migration.name, "Migration applied");
        Ok(())
    }
}

fn db_error(action: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| AppError::database(format!("Failed to {}: {}", action, e))
}
