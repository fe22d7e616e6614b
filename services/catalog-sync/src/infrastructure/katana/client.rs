//! Katana HTTP 客户端

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::{ExposeSecret, Secret};
use stockbridge_common::retry::{RetryConfig, is_retryable_error, with_conditional_retry};
use stockbridge_common::types::Pagination;
use stockbridge_errors::{AppError, AppResult};
use tracing::{debug, info};
use url::Url;

use crate::domain::entities::SourceProduct;
use crate::domain::gateways::SourceGateway;
use crate::domain::value_objects::SourceProductId;

use super::dto::{KatanaProduct, ProductListResponse};

/// 防止上游分页异常导致无限循环
const MAX_PAGES: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct KatanaSettings {
    pub base_url: String,
    pub api_key: Secret<String>,
    pub page_size: u32,
    pub request_timeout: Duration,
}

pub struct KatanaClient {
    http: reqwest::Client,
    products_url: Url,
    api_key: Secret<String>,
    page_size: u32,
    retry: RetryConfig,
}

/// 一个变体展开为一个上游产品，已归档的产品跳过
pub fn products_from_katana(product: KatanaProduct) -> Vec<SourceProduct> {
    if product.archived_at.is_some() {
        return Vec::new();
    }
    let KatanaProduct {
        name,
        uom,
        category_name,
        updated_at,
        variants,
        ..
    } = product;

    variants
        .into_iter()
        .map(|variant| {
            let code = variant
                .sku
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("KAT-{}", variant.id));
            let barcode = variant.registered_barcode.or(variant.internal_barcode);

            let mut item = SourceProduct::new(SourceProductId::new(variant.id.to_string()), code, name.clone())
                .with_sales_price(variant.sales_price)
                .with_purchase_price(variant.purchase_price)
                .with_category(category_name.clone())
                .with_unit(uom.clone())
                .with_barcode(barcode);
            if let Some(updated_at) = updated_at {
                item = item.with_updated_at(updated_at);
            }
            item
        })
        .collect()
}

impl KatanaClient {
    pub fn new(settings: KatanaSettings, retry: RetryConfig) -> AppResult<Self> {
        let mut base = settings.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let products_url = Url::parse(&base)
            .and_then(|u| u.join("products"))
            .map_err(|e| AppError::validation(format!("上游地址无效 {}: {}", base, e)))?;

        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| AppError::internal(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            http,
            products_url,
            api_key: settings.api_key,
            page_size: settings.page_size.max(1),
            retry,
        })
    }

    async fn fetch_page(
        &self,
        since: Option<DateTime<Utc>>,
        page: Pagination,
    ) -> AppResult<Vec<KatanaProduct>> {
        let mut request = self
            .http
            .get(self.products_url.clone())
            .bearer_auth(self.api_key.expose_secret())
            .query(&[("page", page.page), ("limit", page.page_size)]);
        if let Some(since) = since {
            request = request.query(&[(
                "updated_at_min",
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            )]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                AppError::external_service(format!("Katana temporarily unavailable: {}", e))
            } else {
                AppError::external_service(format!("请求 Katana 失败: {}", e))
            }
        })?;
        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::external_service(format!(
                "Katana temporarily unavailable: HTTP {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(AppError::external_service(format!("Katana 返回 HTTP {}", status)));
        }

        let body: ProductListResponse = response
            .json()
            .await
            .map_err(|e| AppError::external_service(format!("解析 Katana 响应失败: {}", e)))?;
        Ok(body.data)
    }
}

/// 只重试连接类错误和 5xx / 429
fn should_retry(error: &AppError) -> bool {
    let message = error.to_string();
    is_retryable_error(&message) || message.contains("temporarily unavailable")
}

#[async_trait]
impl SourceGateway for KatanaClient {
    async fn fetch_changed_products(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<SourceProduct>> {
        let mut page = Pagination::new(1, self.page_size);
        let mut products = Vec::new();

        loop {
            let rows = with_conditional_retry(
                &self.retry,
                "katana_fetch_products",
                || self.fetch_page(since, page),
                should_retry,
            )
            .await?;
            let returned = rows.len();
            debug!(page = page.page, returned, "Katana page fetched");

            products.extend(rows.into_iter().flat_map(products_from_katana));

            if page.is_last_page(returned) || page.page >= MAX_PAGES {
                break;
            }
            page = page.next();
        }

        info!(count = products.len(), pages = page.page, "Katana products fetched");
        Ok(products)
    }
}
