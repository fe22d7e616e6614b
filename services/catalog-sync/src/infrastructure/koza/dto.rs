//! Koza 请求体

use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub org_code: &'a str,
    pub user_name: &'a str,
    pub user_password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSelectRequest {
    pub org_sirket_sube_id: i64,
}

/// 库存卡片过滤条件
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockCardFilter<'a> {
    pub kod_bas: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kod_bit: Option<&'a str>,
    pub kod_op: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockCardListRequest<'a> {
    pub stk_skart: StockCardFilter<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl<'a> StockCardListRequest<'a> {
    /// 按编码精确查找
    pub fn exact(code: &'a str) -> Self {
        Self {
            stk_skart: StockCardFilter {
                kod_bas: code,
                kod_bit: Some(code),
                kod_op: "between",
            },
            start: None,
            limit: None,
        }
    }

    /// 分页列出全部
    pub fn page(start: u32, limit: u32) -> Self {
        Self {
            stk_skart: StockCardFilter {
                kod_bas: "",
                kod_bit: None,
                kod_op: "like",
            },
            start: Some(start),
            limit: Some(limit),
        }
    }
}
