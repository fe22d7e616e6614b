//! 下游会话管理
//!
//! 进程内只有一个逻辑会话。过期或失效时通过单飞（single-flight）刷新：
//! 并发调用方只等待同一次登录，并共享它的结果（包括失败）。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use stockbridge_common::mask_secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::gateways::{DownstreamError, DownstreamGateway, DownstreamResult};
use crate::metrics;

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    refresh_count: u64,
    failed_logins: u64,
    last_refresh_at: Option<DateTime<Utc>>,
    /// 每次登录完成、设置或清除会话时递增
    generation: u64,
    /// 最近一次登录失败的错误，成功登录后清空
    last_error: Option<DownstreamError>,
}

impl SessionState {
    fn valid_token(&self, now: DateTime<Utc>, buffer: chrono::Duration) -> Option<&str> {
        match (&self.token, self.expires_at) {
            (Some(token), Some(expires_at)) if now < expires_at - buffer => Some(token),
            _ => None,
        }
    }

    /// 尚未真正过期的令牌（不考虑刷新缓冲）
    fn unexpired_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.token, self.expires_at) {
            (Some(token), Some(expires_at)) if now < expires_at => Some(token),
            _ => None,
        }
    }
}

/// 会话诊断快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub has_token: bool,
    /// 遮盖后的令牌（首尾各 4 位）
    pub token_preview: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub refresh_count: u64,
    pub failed_logins: u64,
    pub remaining_secs: i64,
    pub is_valid: bool,
    pub last_error: Option<String>,
}

/// 会话管理器
pub struct SessionManager {
    gateway: Arc<dyn DownstreamGateway>,
    refresh_buffer: chrono::Duration,
    state: RwLock<SessionState>,
    refresh_gate: Mutex<()>,
}

impl SessionManager {
    /// `refresh_buffer`：距离过期不足该时长时视为无效
    pub fn new(gateway: Arc<dyn DownstreamGateway>, refresh_buffer: Duration) -> Self {
        Self {
            gateway,
            refresh_buffer: chrono::Duration::from_std(refresh_buffer)
                .unwrap_or_else(|_| chrono::Duration::zero()),
            state: RwLock::new(SessionState::default()),
            refresh_gate: Mutex::new(()),
        }
    }

    /// 获取有效会话令牌，必要时触发单飞刷新
    pub async fn get_active_session(&self) -> DownstreamResult<String> {
        let observed = {
            let state = self.state.read();
            if let Some(token) = state.valid_token(Utc::now(), self.refresh_buffer) {
                return Ok(token.to_string());
            }
            state.generation
        };

        let _gate = self.refresh_gate.lock().await;

        {
            let state = self.state.read();
            if state.generation != observed {
                // 等待期间已有其他调用方完成登录，直接复用其结果
                if let Some(token) = state.valid_token(Utc::now(), self.refresh_buffer) {
                    return Ok(token.to_string());
                }
                if let Some(err) = &state.last_error {
                    return Err(err.clone());
                }
                // 刚签发的令牌即使已落在刷新缓冲内也先复用，避免等待者逐个重新登录
                if let Some(token) = state.unexpired_token(Utc::now()) {
                    return Ok(token.to_string());
                }
            }
        }

        self.login_locked().await
    }

    /// 无条件重新登录
    pub async fn refresh_session(&self) -> DownstreamResult<String> {
        let _gate = self.refresh_gate.lock().await;
        self.login_locked().await
    }

    /// 仅当当前令牌仍是 `stale_token` 时重新登录
    ///
    /// 多个调用方同时发现同一个令牌失效时，只有第一个会真正登录
    pub async fn refresh_if_current(&self, stale_token: &str) -> DownstreamResult<String> {
        let _gate = self.refresh_gate.lock().await;
        {
            let state = self.state.read();
            if let Some(token) = state.valid_token(Utc::now(), self.refresh_buffer) {
                if token != stale_token {
                    return Ok(token.to_string());
                }
            }
        }
        self.login_locked().await
    }

    /// 当前会话是否有效（不阻塞）
    pub fn is_session_valid(&self) -> bool {
        self.state
            .read()
            .valid_token(Utc::now(), self.refresh_buffer)
            .is_some()
    }

    /// 直接设置会话，不经过登录
    pub fn set_session(&self, token: impl Into<String>, expires_at: DateTime<Utc>) {
        let mut state = self.state.write();
        state.token = Some(token.into());
        state.issued_at = Some(Utc::now());
        state.expires_at = Some(expires_at);
        state.last_error = None;
        state.generation += 1;
        debug!(expires_at = %expires_at, "Session set manually");
    }

    /// 清除会话，下次获取时重新登录
    pub fn clear_session(&self) {
        let mut state = self.state.write();
        state.token = None;
        state.issued_at = None;
        state.expires_at = None;
        state.last_error = None;
        state.generation += 1;
        info!("Session cleared");
    }

    /// 诊断快照
    pub fn get_stats(&self) -> SessionStats {
        let now = Utc::now();
        let state = self.state.read();
        let remaining_secs = state
            .expires_at
            .map(|e| (e - now).num_seconds().max(0))
            .unwrap_or(0);
        SessionStats {
            has_token: state.token.is_some(),
            token_preview: state.token.as_deref().map(mask_secret),
            issued_at: state.issued_at,
            expires_at: state.expires_at,
            last_refresh_at: state.last_refresh_at,
            refresh_count: state.refresh_count,
            failed_logins: state.failed_logins,
            remaining_secs,
            is_valid: state.valid_token(now, self.refresh_buffer).is_some(),
            last_error: state.last_error.as_ref().map(|e| e.to_string()),
        }
    }

    /// 调用方必须持有 `refresh_gate`
    async fn login_locked(&self) -> DownstreamResult<String> {
        match self.gateway.login().await {
            Ok(session) => {
                let now = Utc::now();
                let mut state = self.state.write();
                state.token = Some(session.token.clone());
                state.issued_at = Some(now);
                state.expires_at = Some(session.expires_at);
                state.refresh_count += 1;
                state.last_refresh_at = Some(now);
                state.last_error = None;
                state.generation += 1;
                metrics::record_session_login(true);
                info!(
                    token = %mask_secret(&session.token),
                    expires_at = %session.expires_at,
                    refresh_count = state.refresh_count,
                    "Downstream session refreshed"
                );
                Ok(session.token)
            }
            Err(e) => {
                // 临时性错误保持原样交给调用方重试，其余一律视为认证失败
                let err = match e {
                    DownstreamError::Transient(msg) => DownstreamError::Transient(msg),
                    DownstreamError::Auth(msg) => DownstreamError::Auth(msg),
                    other => DownstreamError::Auth(other.to_string()),
                };
                let mut state = self.state.write();
                state.token = None;
                state.issued_at = None;
                state.expires_at = None;
                state.failed_logins += 1;
                state.last_error = Some(err.clone());
                state.generation += 1;
                metrics::record_session_login(false);
                warn!(error = %err, "Downstream login failed");
                Err(err)
            }
        }
    }
}
