//! 内容哈希
//!
//! 对产品的业务字段做稳定哈希，用来判断产品是否发生实质变化

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::entities::SourceProduct;
use crate::domain::value_objects::canonicalize;

/// SHA-256 内容哈希（64 位大写十六进制）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

/// 参与哈希的字段，字段顺序即序列化顺序
#[derive(Serialize)]
struct HashInput<'a> {
    code: String,
    name: &'a str,
    price: Option<String>,
    category: Option<&'a str>,
    unit: Option<String>,
    purchase_vat: Option<String>,
    sales_vat: Option<String>,
}

fn normalize_decimal(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.normalize().to_string())
}

fn normalize_text(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

impl ContentHash {
    /// 计算产品的内容哈希
    ///
    /// 条码、更新时间等不影响下游卡片内容的字段不参与计算
    pub fn of(product: &SourceProduct) -> Self {
        let input = HashInput {
            code: canonicalize(product.base_code()),
            name: product.name().trim(),
            price: normalize_decimal(product.sales_price()),
            category: normalize_text(product.category()),
            unit: normalize_text(product.unit()).map(canonicalize),
            purchase_vat: normalize_decimal(product.purchase_vat_rate()),
            sales_vat: normalize_decimal(product.sales_vat_rate()),
        };
        // 结构体只含字符串和 Option，序列化不会失败
        let bytes = serde_json::to_vec(&input).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        Self(hex::encode_upper(digest))
    }

    /// 从已存储的值恢复
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
