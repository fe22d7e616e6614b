//! Katana 响应结构

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ProductListResponse {
    #[serde(default)]
    pub data: Vec<KatanaProduct>,
}

#[derive(Debug, Deserialize)]
pub struct KatanaProduct {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub uom: Option<String>,
    pub category_name: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub variants: Vec<KatanaVariant>,
}

#[derive(Debug, Deserialize)]
pub struct KatanaVariant {
    pub id: i64,
    pub sku: Option<String>,
    pub sales_price: Option<Decimal>,
    pub purchase_price: Option<Decimal>,
    pub internal_barcode: Option<String>,
    pub registered_barcode: Option<String>,
}
