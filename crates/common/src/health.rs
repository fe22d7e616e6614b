//! 通用健康检查模块
//!
//! 提供健康检查的通用 trait 和基础类型

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 基础健康检查结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseHealthResult {
    /// 是否健康
    pub healthy: bool,
    /// 延迟（毫秒）
    pub latency_ms: Option<u64>,
    /// 错误信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BaseHealthResult {
    /// 创建健康结果
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            healthy: true,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    /// 创建不健康结果
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms: None,
            error: Some(error.into()),
        }
    }

    /// 创建超时结果
    pub fn timeout() -> Self {
        Self::unhealthy("Health check timed out")
    }
}

/// 健康检查 trait
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// 执行健康检查
    async fn check(&self) -> BaseHealthResult;

    /// 获取组件名称
    fn component_name(&self) -> &'static str;
}

/// 带超时执行一次健康检查
pub async fn check_with_timeout(check: &dyn HealthCheck, timeout: Duration) -> BaseHealthResult {
    let start = Instant::now();
    match tokio::time::timeout(timeout, check.check()).await {
        Ok(mut result) => {
            if result.healthy && result.latency_ms.is_none() {
                result.latency_ms = Some(start.elapsed().as_millis() as u64);
            }
            result
        }
        Err(_) => BaseHealthResult::timeout(),
    }
}
