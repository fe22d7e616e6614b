//! 数据库行映射结构

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// 产品映射数据库行
#[derive(Debug, FromRow)]
pub struct MappingRow {
    pub id: Uuid,
    pub source_id: String,
    pub canonical_base_code: String,
    pub version: i32,
    pub canonical_versioned_code: String,
    pub downstream_id: Option<i64>,
    pub status: String,
    pub content_hash: String,
    pub snapshot: serde_json::Value,
    pub error_message: Option<String>,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
}
