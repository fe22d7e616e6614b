//! 下游库存卡片请求体

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::entities::ProductMapping;
use crate::domain::value_objects::canonicalize;

/// 卡片名称最大长度
const MAX_CARD_NAME_CHARS: usize = 255;

/// 长名称最大长度
const MAX_LONG_NAME_CHARS: usize = 500;

/// 生成请求体时使用的默认值
#[derive(Debug, Clone)]
pub struct PayloadDefaults {
    pub card_type: i32,
    pub card_kind: i32,
    pub default_unit_id: i64,
    /// 规范化后的单位名称 -> 下游单位 id
    pub unit_ids: HashMap<String, i64>,
    pub default_category_code: Option<String>,
    /// 规范化后的上游分类名称 -> 下游分类树编码
    pub category_codes: HashMap<String, String>,
    /// 百分比形式，例如 20 表示 20%
    pub default_vat_rate: Decimal,
    pub sellable: bool,
    pub purchasable: bool,
    pub cost_tracked: bool,
}

impl Default for PayloadDefaults {
    fn default() -> Self {
        Self {
            card_type: 1,
            card_kind: 1,
            default_unit_id: 5,
            unit_ids: HashMap::new(),
            default_category_code: None,
            category_codes: HashMap::new(),
            default_vat_rate: Decimal::from(20),
            sellable: true,
            purchasable: true,
            cost_tracked: true,
        }
    }
}

impl PayloadDefaults {
    fn unit_id(&self, unit: Option<&str>) -> i64 {
        unit.map(canonicalize)
            .and_then(|u| self.unit_ids.get(&u).copied())
            .unwrap_or(self.default_unit_id)
    }

    fn category_code(&self, category: Option<&str>) -> Option<String> {
        category
            .map(canonicalize)
            .and_then(|c| self.category_codes.get(&c).cloned())
            .or_else(|| self.default_category_code.clone())
    }
}

/// 库存卡片创建请求（`EkleStkWsSkart.do`）
///
/// 值为 None 的字段不会出现在 JSON 中
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockCardPayload {
    pub kart_kodu: String,
    pub kart_adi: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uzun_adi: Option<String>,
    pub kart_turu: i32,
    pub kart_tipi: i32,
    pub olcum_birimi_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kategori_agac_kod: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barkod: Option<String>,
    /// 小数形式（0.20）
    #[serde(with = "rust_decimal::serde::float")]
    pub kart_alis_kdv_oran: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub kart_satis_kdv_oran: Decimal,
    /// dd/MM/yyyy
    pub baslangic_tarihi: String,
    pub satilabilir_flag: u8,
    pub satin_alinabilir_flag: u8,
    pub maliyet_hesaplanacak_flag: u8,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub perakende_satis_birim_fiyat: Option<Decimal>,
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn percent_to_fraction(rate: Decimal) -> Decimal {
    (rate / Decimal::from(100)).normalize()
}

impl StockCardPayload {
    /// 根据映射快照生成请求体
    ///
    /// 编码使用映射的规范化版本编码；第 2 版及以后不带条码，
    /// 因为旧版本卡片已经占用了同一个条码
    pub fn from_mapping(mapping: &ProductMapping, defaults: &PayloadDefaults, today: NaiveDate) -> Self {
        let product = mapping.snapshot();
        let code = canonicalize(mapping.canonical_versioned_code().as_str());

        let trimmed_name = product.name().trim();
        let name = if trimmed_name.is_empty() {
            code.clone()
        } else {
            trimmed_name.to_string()
        };
        let kart_adi = truncate_chars(&name, MAX_CARD_NAME_CHARS);
        let uzun_adi = (name.chars().count() > MAX_CARD_NAME_CHARS)
            .then(|| truncate_chars(&name, MAX_LONG_NAME_CHARS));

        let barkod = if mapping.is_versioned() {
            None
        } else {
            product.barcode().map(|b| b.trim().to_string())
        };

        let purchase_vat = product.purchase_vat_rate().unwrap_or(defaults.default_vat_rate);
        let sales_vat = product.sales_vat_rate().unwrap_or(defaults.default_vat_rate);

        Self {
            kart_kodu: code,
            kart_adi,
            uzun_adi,
            kart_turu: defaults.card_kind,
            kart_tipi: defaults.card_type,
            olcum_birimi_id: defaults.unit_id(product.unit()),
            kategori_agac_kod: defaults.category_code(product.category()),
            barkod,
            kart_alis_kdv_oran: percent_to_fraction(purchase_vat),
            kart_satis_kdv_oran: percent_to_fraction(sales_vat),
            baslangic_tarihi: today.format("%d/%m/%Y").to_string(),
            satilabilir_flag: u8::from(defaults.sellable),
            satin_alinabilir_flag: u8::from(defaults.purchasable),
            maliyet_hesaplanacak_flag: u8::from(defaults.cost_tracked),
            perakende_satis_birim_fiyat: product.sales_price(),
        }
    }
}
