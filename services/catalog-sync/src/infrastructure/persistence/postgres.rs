//! PostgreSQL repository implementation

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use stockbridge_errors::{AppError, AppResult};
use tracing::debug;

use crate::domain::entities::ProductMapping;
use crate::domain::enums::MappingStatus;
use crate::domain::repositories::MappingRepository;
use crate::domain::value_objects::{MappingId, SourceProductId};

use super::converters::{mapping_from_row, mappings_from_rows, snapshot_to_json};
use super::rows::MappingRow;

const SELECT_COLUMNS: &str = r#"
    SELECT id, source_id, canonical_base_code, version, canonical_versioned_code,
           downstream_id, status, content_hash, snapshot, error_message, attempt_count,
           created_at, updated_at, synced_at
    FROM product_mappings
"#;

/// 唯一约束冲突转换为 Conflict，其余为 Database
fn map_write_error(context: &str, e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            return AppError::conflict(format!("{}: 违反唯一约束 {}", context, db.message()));
        }
    }
    AppError::database(format!("{}失败: {}", context, e))
}

pub struct PostgresMappingRepository {
    pool: PgPool,
}

impl PostgresMappingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert<'e, E>(executor: E, mapping: &ProductMapping) -> AppResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let snapshot = snapshot_to_json(mapping)?;
        sqlx::query(
            r#"
            INSERT INTO product_mappings (
                id, source_id, canonical_base_code, version, canonical_versioned_code,
                downstream_id, status, content_hash, snapshot, error_message, attempt_count,
                created_at, updated_at, synced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(mapping.id().0)
        .bind(mapping.source_id().as_str())
        .bind(mapping.canonical_base_code().as_str())
        .bind(mapping.version() as i32)
        .bind(mapping.canonical_versioned_code().as_str())
        .bind(mapping.downstream_id().map(|id| id.value()))
        .bind(mapping.status().as_str())
        .bind(mapping.content_hash().as_str())
        .bind(snapshot)
        .bind(mapping.error_message())
        .bind(mapping.attempt_count() as i32)
        .bind(mapping.created_at())
        .bind(mapping.updated_at())
        .bind(mapping.synced_at())
        .execute(executor)
        .await
        .map_err(|e| map_write_error("插入产品映射", e))?;
        Ok(())
    }
}

#[async_trait]
impl MappingRepository for PostgresMappingRepository {
    async fn find_active(&self, source_id: &SourceProductId) -> AppResult<Option<ProductMapping>> {
        let sql = format!("{} WHERE source_id = $1 AND status <> 'SUPERSEDED'", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, MappingRow>(&sql)
            .bind(source_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("查询活跃映射失败: {}", e)))?;

        row.map(mapping_from_row).transpose()
    }

    async fn find_by_id(&self, id: &MappingId) -> AppResult<Option<ProductMapping>> {
        let sql = format!("{} WHERE id = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, MappingRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("查询映射失败: {}", e)))?;

        row.map(mapping_from_row).transpose()
    }

    async fn insert_first(&self, mapping: &ProductMapping) -> AppResult<()> {
        Self::insert(&self.pool, mapping).await?;
        debug!(source_id = %mapping.source_id(), code = %mapping.canonical_versioned_code(), "Mapping inserted");
        Ok(())
    }

    async fn supersede_and_append(
        &self,
        previous: &ProductMapping,
        next: &ProductMapping,
    ) -> AppResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("开启事务失败: {}", e)))?;

        let current: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT status FROM product_mappings
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(previous.id().0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("锁定映射失败: {}", e)))?;

        match current {
            None => {
                return Err(AppError::not_found(format!("映射 {} 不存在", previous.id())));
            }
            Some((status,)) if status == MappingStatus::Superseded.as_str() => {
                return Err(AppError::conflict(format!(
                    "映射 {} 已被其他版本取代",
                    previous.id()
                )));
            }
            Some(_) => {}
        }

        sqlx::query(
            r#"
            UPDATE product_mappings
            SET status = 'SUPERSEDED', updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(previous.id().0)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("取代旧映射失败: {}", e)))?;

        Self::insert(&mut *tx, next).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("提交事务失败: {}", e)))?;
        Ok(())
    }

    async fn save_outcome(&self, mapping: &ProductMapping) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE product_mappings
            SET status = $2, downstream_id = $3, error_message = $4,
                attempt_count = $5, updated_at = $6, synced_at = $7
            WHERE id = $1 AND status <> 'SUPERSEDED'
            "#,
        )
        .bind(mapping.id().0)
        .bind(mapping.status().as_str())
        .bind(mapping.downstream_id().map(|id| id.value()))
        .bind(mapping.error_message())
        .bind(mapping.attempt_count() as i32)
        .bind(mapping.updated_at())
        .bind(mapping.synced_at())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("更新映射状态失败: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::conflict(format!(
                "映射 {} 不存在或已被取代",
                mapping.id()
            )));
        }
        Ok(())
    }

    async fn find_by_status(
        &self,
        status: MappingStatus,
        limit: u32,
    ) -> AppResult<Vec<ProductMapping>> {
        let sql = format!(
            "{} WHERE status = $1 ORDER BY updated_at ASC, source_id ASC LIMIT $2",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, MappingRow>(&sql)
            .bind(status.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("按状态查询映射失败: {}", e)))?;

        mappings_from_rows(rows)
    }

    async fn history(&self, source_id: &SourceProductId) -> AppResult<Vec<ProductMapping>> {
        let sql = format!("{} WHERE source_id = $1 ORDER BY version ASC", SELECT_COLUMNS);
        let rows = sqlx::query_as::<_, MappingRow>(&sql)
            .bind(source_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("查询映射历史失败: {}", e)))?;

        mappings_from_rows(rows)
    }
}
