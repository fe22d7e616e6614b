//! 上游产品快照

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::SourceProductId;

/// 从上游拉取到的产品（一个变体对应一个产品）
///
/// 映射记录会保存一份快照，待同步的映射据此生成下游请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProduct {
    id: SourceProductId,
    /// 原始编码（未规范化）
    base_code: String,
    name: String,
    #[serde(default)]
    sales_price: Option<Decimal>,
    #[serde(default)]
    purchase_price: Option<Decimal>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    barcode: Option<String>,
    #[serde(default)]
    purchase_vat_rate: Option<Decimal>,
    #[serde(default)]
    sales_vat_rate: Option<Decimal>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl SourceProduct {
    pub fn new(id: SourceProductId, base_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            base_code: base_code.into(),
            name: name.into(),
            sales_price: None,
            purchase_price: None,
            category: None,
            unit: None,
            barcode: None,
            purchase_vat_rate: None,
            sales_vat_rate: None,
            updated_at: None,
        }
    }

    pub fn with_sales_price(mut self, price: Option<Decimal>) -> Self {
        self.sales_price = price;
        self
    }

    pub fn with_purchase_price(mut self, price: Option<Decimal>) -> Self {
        self.purchase_price = price;
        self
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    pub fn with_unit(mut self, unit: Option<String>) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_barcode(mut self, barcode: Option<String>) -> Self {
        self.barcode = barcode.filter(|b| !b.trim().is_empty());
        self
    }

    pub fn with_vat_rates(mut self, purchase: Option<Decimal>, sales: Option<Decimal>) -> Self {
        self.purchase_vat_rate = purchase;
        self.sales_vat_rate = sales;
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    // ========== Getters ==========

    pub fn id(&self) -> &SourceProductId {
        &self.id
    }

    pub fn base_code(&self) -> &str {
        &self.base_code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sales_price(&self) -> Option<Decimal> {
        self.sales_price
    }

    pub fn purchase_price(&self) -> Option<Decimal> {
        self.purchase_price
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn barcode(&self) -> Option<&str> {
        self.barcode.as_deref()
    }

    pub fn purchase_vat_rate(&self) -> Option<Decimal> {
        self.purchase_vat_rate
    }

    pub fn sales_vat_rate(&self) -> Option<Decimal> {
        self.sales_vat_rate
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}
