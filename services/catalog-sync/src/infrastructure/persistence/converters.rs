//! 数据库行到领域对象的转换

use stockbridge_errors::{AppError, AppResult};

use crate::domain::entities::{ProductMapping, SourceProduct};
use crate::domain::enums::MappingStatus;
use crate::domain::value_objects::{
    CanonicalCode, ContentHash, DownstreamId, MappingId, SourceProductId,
};

use super::rows::MappingRow;

/// 将 MappingRow 转换为 ProductMapping
pub fn mapping_from_row(row: MappingRow) -> AppResult<ProductMapping> {
    let status: MappingStatus = row
        .status
        .parse()
        .map_err(|e| AppError::database(format!("映射 {} 状态无效: {}", row.id, e)))?;
    let snapshot: SourceProduct = serde_json::from_value(row.snapshot)
        .map_err(|e| AppError::database(format!("映射 {} 快照无法解析: {}", row.id, e)))?;

    Ok(ProductMapping::from_parts(
        MappingId::from_uuid(row.id),
        SourceProductId::new(row.source_id),
        CanonicalCode::new(&row.canonical_base_code),
        row.version.max(1) as u32,
        CanonicalCode::new(&row.canonical_versioned_code),
        row.downstream_id.map(DownstreamId),
        status,
        ContentHash::from_stored(row.content_hash.trim()),
        snapshot,
        row.error_message,
        row.attempt_count.max(0) as u32,
        row.created_at,
        row.updated_at,
        row.synced_at,
    ))
}

/// 快照序列化为 JSONB
pub fn snapshot_to_json(mapping: &ProductMapping) -> AppResult<serde_json::Value> {
    serde_json::to_value(mapping.snapshot())
        .map_err(|e| AppError::internal(format!("序列化产品快照失败: {}", e)))
}

/// 映射行集合转换，任一行失败则整体失败
pub fn mappings_from_rows(rows: Vec<MappingRow>) -> AppResult<Vec<ProductMapping>> {
    rows.into_iter().map(mapping_from_row).collect()
}
