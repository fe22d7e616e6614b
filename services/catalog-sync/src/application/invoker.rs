//! 下游调用执行器
//!
//! 统一的重试策略：临时性错误按退避重试；会话失效或响应异常时刷新一次会话再重试；
//! 冲突、校验、认证错误直接返回。所有等待和调用都可被取消。

use std::future::Future;
use std::sync::Arc;

use stockbridge_common::retry::{RetryConfig, RetryError, with_cancellable_retry};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::application::session::SessionManager;
use crate::domain::gateways::{DownstreamError, DownstreamGateway, DownstreamResult};
use crate::metrics;

/// 调用失败
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvokeError {
    #[error(transparent)]
    Downstream(#[from] DownstreamError),

    #[error("Operation cancelled")]
    Cancelled,
}

pub struct DownstreamInvoker {
    gateway: Arc<dyn DownstreamGateway>,
    sessions: Arc<SessionManager>,
    retry: RetryConfig,
}

impl DownstreamInvoker {
    pub fn new(
        gateway: Arc<dyn DownstreamGateway>,
        sessions: Arc<SessionManager>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            gateway,
            sessions,
            retry,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// 执行一次下游调用
    ///
    /// `call` 接收网关和会话令牌，每次重试都会被重新调用
    pub async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, InvokeError>
    where
        F: Fn(Arc<dyn DownstreamGateway>, String) -> Fut,
        Fut: Future<Output = DownstreamResult<T>>,
    {
        let mut token = self.acquire_session(cancel).await?;
        let mut refreshed = false;

        loop {
            let mut attempts = 0u32;
            let result = with_cancellable_retry(
                &self.retry,
                operation,
                cancel,
                || {
                    attempts += 1;
                    if attempts > 1 {
                        metrics::record_retry("transient");
                    }
                    let fut = call(self.gateway.clone(), token.clone());
                    let cancel = cancel.clone();
                    async move {
                        let result = tokio::select! {
                            _ = cancel.cancelled() => {
                                Err(DownstreamError::Transient("cancelled in flight".to_string()))
                            }
                            r = fut => r,
                        };
                        metrics::record_downstream_call(
                            operation,
                            result.as_ref().err().map(|e| e.class()).unwrap_or("ok"),
                        );
                        result
                    }
                },
                DownstreamError::is_transient,
            )
            .await;

            match result {
                Ok(value) => return Ok(value),
                Err(_) if cancel.is_cancelled() => return Err(InvokeError::Cancelled),
                Err(RetryError::Cancelled(_)) => return Err(InvokeError::Cancelled),
                Err(RetryError::Failed(DownstreamError::BadSessionOrResponse(msg)))
                    if !refreshed =>
                {
                    refreshed = true;
                    metrics::record_retry("bad_session");
                    warn!(
                        operation,
                        error = %msg,
                        "Bad session or response, refreshing session once"
                    );
                    token = self.refresh_session(&token, cancel).await?;
                }
                Err(RetryError::Failed(e)) => return Err(InvokeError::Downstream(e)),
            }
        }
    }

    async fn acquire_session(&self, cancel: &CancellationToken) -> Result<String, InvokeError> {
        self.with_session_retry("session", cancel, || self.sessions.get_active_session())
            .await
    }

    async fn refresh_session(
        &self,
        stale: &str,
        cancel: &CancellationToken,
    ) -> Result<String, InvokeError> {
        self.with_session_retry("session_refresh", cancel, || {
            self.sessions.refresh_if_current(stale)
        })
        .await
    }

    /// 登录的临时性失败同样按退避重试，认证失败直接返回
    async fn with_session_retry<F, Fut>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<String, InvokeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DownstreamResult<String>>,
    {
        match with_cancellable_retry(&self.retry, operation, cancel, op, DownstreamError::is_transient)
            .await
        {
            Ok(token) => Ok(token),
            Err(_) if cancel.is_cancelled() => Err(InvokeError::Cancelled),
            Err(RetryError::Cancelled(_)) => Err(InvokeError::Cancelled),
            Err(RetryError::Failed(e)) => Err(InvokeError::Downstream(e)),
        }
    }
}
