//! 下游（Luca / Koza）网关接口

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stockbridge_common::types::Pagination;
use thiserror::Error;

use crate::domain::gateways::StockCardPayload;
use crate::domain::value_objects::{CanonicalCode, DownstreamId};

/// 下游调用的错误分类
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownstreamError {
    /// 登录失败，不在内部重试
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// 网络抖动、超时、5xx，可退避重试
    #[error("Transient failure: {0}")]
    Transient(String),

    /// 编码已存在，视为成功
    #[error("Record already exists: {message}")]
    Conflict {
        existing_id: Option<DownstreamId>,
        message: String,
    },

    /// 请求体被拒绝，不重试
    #[error("Validation failed: {0}")]
    Validation(String),

    /// 返回了 HTML 或无法解析的内容，按会话失效处理
    #[error("Bad session or response: {0}")]
    BadSessionOrResponse(String),
}

impl DownstreamError {
    /// 指标标签
    pub fn class(&self) -> &'static str {
        match self {
            DownstreamError::Auth(_) => "auth",
            DownstreamError::Transient(_) => "transient",
            DownstreamError::Conflict { .. } => "conflict",
            DownstreamError::Validation(_) => "validation",
            DownstreamError::BadSessionOrResponse(_) => "bad_session",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DownstreamError::Transient(_))
    }
}

pub type DownstreamResult<T> = Result<T, DownstreamError>;

/// 登录得到的会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// 下游库存卡片列表中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamRecord {
    /// 下游返回的原始编码
    pub code: String,
    pub id: DownstreamId,
}

/// 下游网关
///
/// 除 `login` 外的调用都需要一个有效的会话令牌
#[async_trait]
pub trait DownstreamGateway: Send + Sync {
    /// 登录并返回新会话
    async fn login(&self) -> DownstreamResult<DownstreamSession>;

    /// 按编码精确查找库存卡片
    async fn find_by_code(
        &self,
        token: &str,
        code: &CanonicalCode,
    ) -> DownstreamResult<Option<DownstreamId>>;

    /// 创建库存卡片
    ///
    /// 下游成功但未返回 ID 时结果为 `None`
    async fn create(
        &self,
        token: &str,
        payload: &StockCardPayload,
    ) -> DownstreamResult<Option<DownstreamId>>;

    /// 分页列出全部库存卡片（只用于缓存预热）
    async fn list_page(
        &self,
        token: &str,
        page: Pagination,
    ) -> DownstreamResult<Vec<DownstreamRecord>>;
}
