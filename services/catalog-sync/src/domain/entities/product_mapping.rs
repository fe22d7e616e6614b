//! 产品映射实体

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::entities::SourceProduct;
use crate::domain::enums::MappingStatus;
use crate::domain::value_objects::{
    CanonicalCode, ContentHash, DownstreamId, MappingId, SourceProductId,
};

/// 错误信息最大长度（字符）
const MAX_ERROR_MESSAGE_CHARS: usize = 1000;

/// 产品映射
///
/// 上游产品与下游库存卡片之间的持久化关联。每次内容变化都追加一个新版本，
/// 旧版本只被标记为 `Superseded`，不会被修改内容或删除。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMapping {
    id: MappingId,
    source_id: SourceProductId,
    canonical_base_code: CanonicalCode,
    version: u32,
    canonical_versioned_code: CanonicalCode,
    downstream_id: Option<DownstreamId>,
    status: MappingStatus,
    content_hash: ContentHash,
    #[serde(skip_serializing)]
    snapshot: SourceProduct,
    error_message: Option<String>,
    attempt_count: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    synced_at: Option<DateTime<Utc>>,
}

impl ProductMapping {
    /// 为首次出现的产品创建第 1 版映射
    pub fn first_version(product: SourceProduct, hash: ContentHash) -> Self {
        let base = CanonicalCode::new(product.base_code());
        let now = Utc::now();
        Self {
            id: MappingId::new(),
            source_id: product.id().clone(),
            canonical_versioned_code: base.clone(),
            canonical_base_code: base,
            version: 1,
            downstream_id: None,
            status: MappingStatus::Pending,
            content_hash: hash,
            snapshot: product,
            error_message: None,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
            synced_at: None,
        }
    }

    /// 基于当前映射创建下一版本
    ///
    /// 版本号在当前映射基础上加一，基础编码取自新的产品快照
    pub fn next_version(&self, product: SourceProduct, hash: ContentHash, suffix: &str) -> Self {
        let version = self.version + 1;
        let base = CanonicalCode::new(product.base_code());
        let now = Utc::now();
        Self {
            id: MappingId::new(),
            source_id: self.source_id.clone(),
            canonical_versioned_code: base.versioned(version, suffix),
            canonical_base_code: base,
            version,
            downstream_id: None,
            status: MappingStatus::Pending,
            content_hash: hash,
            snapshot: product,
            error_message: None,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
            synced_at: None,
        }
    }

    /// 从持久化数据重建
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: MappingId,
        source_id: SourceProductId,
        canonical_base_code: CanonicalCode,
        version: u32,
        canonical_versioned_code: CanonicalCode,
        downstream_id: Option<DownstreamId>,
        status: MappingStatus,
        content_hash: ContentHash,
        snapshot: SourceProduct,
        error_message: Option<String>,
        attempt_count: u32,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        synced_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            source_id,
            canonical_base_code,
            version,
            canonical_versioned_code,
            downstream_id,
            status,
            content_hash,
            snapshot,
            error_message,
            attempt_count,
            created_at,
            updated_at,
            synced_at,
        }
    }

    // ========== Getters ==========

    pub fn id(&self) -> &MappingId {
        &self.id
    }

    pub fn source_id(&self) -> &SourceProductId {
        &self.source_id
    }

    pub fn canonical_base_code(&self) -> &CanonicalCode {
        &self.canonical_base_code
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn canonical_versioned_code(&self) -> &CanonicalCode {
        &self.canonical_versioned_code
    }

    pub fn downstream_id(&self) -> Option<DownstreamId> {
        self.downstream_id
    }

    pub fn status(&self) -> MappingStatus {
        self.status
    }

    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    pub fn snapshot(&self) -> &SourceProduct {
        &self.snapshot
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// 是否为追加出来的新版本（第 2 版及以后）
    pub fn is_versioned(&self) -> bool {
        self.version > 1
    }

    // ========== 状态变更 ==========

    /// 标记同步成功
    ///
    /// 冲突响应里没有 id 时 `downstream_id` 为 None，保留已有的 id
    pub fn mark_synced(&mut self, downstream_id: Option<DownstreamId>) {
        let now = Utc::now();
        if downstream_id.is_some() {
            self.downstream_id = downstream_id;
        }
        self.status = MappingStatus::Synced;
        self.error_message = None;
        self.attempt_count += 1;
        self.synced_at = Some(now);
        self.updated_at = now;
    }

    /// 标记同步失败
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        let message: String = message.into();
        self.status = MappingStatus::Failed;
        self.error_message = Some(message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect());
        self.attempt_count += 1;
        self.updated_at = Utc::now();
    }

    /// 失败映射重新排队（同一版本，不分配新版本号）
    pub fn requeue(&mut self) {
        self.status = MappingStatus::Pending;
        self.updated_at = Utc::now();
    }

    /// 被新版本取代
    pub fn supersede(&mut self) {
        self.status = MappingStatus::Superseded;
        self.updated_at = Utc::now();
    }
}
