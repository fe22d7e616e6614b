//! 映射查询

use std::sync::Arc;

use stockbridge_errors::{AppError, AppResult};

use crate::domain::entities::ProductMapping;
use crate::domain::enums::MappingStatus;
use crate::domain::repositories::MappingRepository;
use crate::domain::value_objects::SourceProductId;

/// 列表查询的默认上限
pub const DEFAULT_LIST_LIMIT: u32 = 500;

pub struct MappingQueries {
    repository: Arc<dyn MappingRepository>,
}

impl MappingQueries {
    pub fn new(repository: Arc<dyn MappingRepository>) -> Self {
        Self { repository }
    }

    /// 产品当前的活跃映射
    pub async fn get_mapping_status(&self, source_id: &SourceProductId) -> AppResult<ProductMapping> {
        self.repository
            .find_active(source_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("产品 {} 没有映射记录", source_id)))
    }

    pub async fn get_pending_mappings(&self, limit: Option<u32>) -> AppResult<Vec<ProductMapping>> {
        self.repository
            .find_by_status(MappingStatus::Pending, limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await
    }

    pub async fn get_failed_mappings(&self, limit: Option<u32>) -> AppResult<Vec<ProductMapping>> {
        self.repository
            .find_by_status(MappingStatus::Failed, limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await
    }

    /// 全部版本（含已取代），按版本号升序
    pub async fn get_mapping_history(
        &self,
        source_id: &SourceProductId,
    ) -> AppResult<Vec<ProductMapping>> {
        let history = self.repository.history(source_id).await?;
        if history.is_empty() {
            return Err(AppError::not_found(format!("产品 {} 没有映射记录", source_id)));
        }
        Ok(history)
    }
}
