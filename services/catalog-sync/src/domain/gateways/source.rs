//! 上游（Katana）网关接口

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stockbridge_errors::AppResult;

use crate::domain::entities::SourceProduct;

/// 上游产品来源
#[async_trait]
pub trait SourceGateway: Send + Sync {
    /// 拉取 `since` 之后变化过的产品，`since` 为 None 时拉取全部
    async fn fetch_changed_products(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<SourceProduct>>;
}
