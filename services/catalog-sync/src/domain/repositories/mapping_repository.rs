//! 映射仓储接口

use async_trait::async_trait;
use stockbridge_errors::AppResult;

use crate::domain::entities::ProductMapping;
use crate::domain::enums::MappingStatus;
use crate::domain::value_objects::{MappingId, SourceProductId};

/// 产品映射仓储接口
///
/// 只追加，不删除。实现必须保证同一个 `source_id` 最多只有一条活跃映射，
/// 且 `(source_id, version)` 不重复。
#[async_trait]
pub trait MappingRepository: Send + Sync {
    /// 查找产品当前的活跃映射
    async fn find_active(&self, source_id: &SourceProductId) -> AppResult<Option<ProductMapping>>;

    /// 根据 ID 查找映射
    async fn find_by_id(&self, id: &MappingId) -> AppResult<Option<ProductMapping>>;

    /// 插入第 1 版映射
    ///
    /// 已存在活跃映射时返回 `AppError::Conflict`
    async fn insert_first(&self, mapping: &ProductMapping) -> AppResult<()>;

    /// 原子地取代旧映射并追加新版本
    ///
    /// `previous` 已不是活跃映射（被并发修改）时返回 `AppError::Conflict`
    async fn supersede_and_append(
        &self,
        previous: &ProductMapping,
        next: &ProductMapping,
    ) -> AppResult<()>;

    /// 保存同步结果（状态、下游 ID、错误信息、尝试次数、时间戳）
    ///
    /// 只会更新活跃映射，已取代的行保持不变
    async fn save_outcome(&self, mapping: &ProductMapping) -> AppResult<()>;

    /// 按状态查询活跃映射，按更新时间升序
    async fn find_by_status(&self, status: MappingStatus, limit: u32)
    -> AppResult<Vec<ProductMapping>>;

    /// 产品的全部版本，按版本号升序
    async fn history(&self, source_id: &SourceProductId) -> AppResult<Vec<ProductMapping>>;
}
