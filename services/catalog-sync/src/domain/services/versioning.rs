//! 版本决策
//!
//! 下游不支持修改库存卡片，产品内容变化时只能创建一张新卡片。
//! 这里根据内容哈希决定：不变、创建第 1 版，或取代旧版本并追加新版本。

use crate::domain::entities::{ProductMapping, SourceProduct};
use crate::domain::value_objects::ContentHash;

/// 版本决策结果
#[derive(Debug, Clone)]
pub enum VersionDecision {
    /// 内容未变化，沿用当前映射
    Unchanged(ProductMapping),
    /// 首次出现，创建第 1 版
    CreateFirst(ProductMapping),
    /// 内容变化，取代 `previous` 并追加 `next`
    CreateNext {
        previous: ProductMapping,
        next: ProductMapping,
    },
}

impl VersionDecision {
    /// 需要同步到下游的映射（不变时为 None）
    pub fn pending(&self) -> Option<&ProductMapping> {
        match self {
            VersionDecision::Unchanged(_) => None,
            VersionDecision::CreateFirst(mapping) => Some(mapping),
            VersionDecision::CreateNext { next, .. } => Some(next),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VersionDecision::Unchanged(_) => "unchanged",
            VersionDecision::CreateFirst(_) => "create_first",
            VersionDecision::CreateNext { .. } => "create_next",
        }
    }
}

/// 版本决策引擎（纯函数，不访问存储）
#[derive(Debug, Clone)]
pub struct VersioningPolicy {
    version_suffix: String,
}

impl Default for VersioningPolicy {
    fn default() -> Self {
        Self::new("-V")
    }
}

impl VersioningPolicy {
    pub fn new(version_suffix: impl Into<String>) -> Self {
        Self {
            version_suffix: version_suffix.into(),
        }
    }

    pub fn version_suffix(&self) -> &str {
        &self.version_suffix
    }

    /// 根据当前活跃映射做出决策
    pub fn decide(&self, product: SourceProduct, active: Option<ProductMapping>) -> VersionDecision {
        let hash = ContentHash::of(&product);
        match active {
            None => VersionDecision::CreateFirst(ProductMapping::first_version(product, hash)),
            Some(current) if current.content_hash() == &hash => VersionDecision::Unchanged(current),
            Some(previous) => {
                let next = previous.next_version(product, hash, &self.version_suffix);
                let mut previous = previous;
                previous.supersede();
                VersionDecision::CreateNext { previous, next }
            }
        }
    }
}
