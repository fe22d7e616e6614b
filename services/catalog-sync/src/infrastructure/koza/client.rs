//! Koza HTTP 客户端

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, SET_COOKIE};
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use serde_json::Value;
use stockbridge_common::types::Pagination;
use stockbridge_errors::{AppError, AppResult};
use tracing::{debug, info};
use url::Url;

use crate::domain::gateways::{
    DownstreamError, DownstreamGateway, DownstreamRecord, DownstreamResult, DownstreamSession,
    StockCardPayload,
};
use crate::domain::value_objects::{CanonicalCode, DownstreamId, canonicalize};

use super::dto::{BranchSelectRequest, LoginRequest, StockCardListRequest};
use super::response::{
    ResponseClassifier, classify_transport, extract_id, extract_rows, preview, row_code,
};

const LOGIN_PATH: &str = "Giris.do";
const BRANCH_PATH: &str = "GuncelleYtkSirketSubeDegistir.do";
const LIST_PATH: &str = "ListeleStkSkart.do";
const CREATE_PATH: &str = "EkleStkWsSkart.do";
const SESSION_COOKIE: &str = "JSESSIONID";

/// Koza 连接参数
#[derive(Debug, Clone)]
pub struct KozaSettings {
    pub base_url: String,
    pub org_code: String,
    pub username: String,
    pub password: Secret<String>,
    pub branch_id: Option<i64>,
    pub session_ttl: Duration,
    pub request_timeout: Duration,
    pub duplicate_markers: Vec<String>,
    pub session_expired_codes: Vec<i64>,
}

pub struct KozaClient {
    http: reqwest::Client,
    base_url: Url,
    settings: KozaSettings,
    classifier: ResponseClassifier,
}

/// 从 `Set-Cookie` 中取出会话 ID
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(SESSION_COOKIE))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// 登录阶段的失败除临时性错误外都是认证失败
fn as_login_error(error: DownstreamError) -> DownstreamError {
    match error {
        DownstreamError::Transient(msg) => DownstreamError::Transient(msg),
        other => DownstreamError::Auth(other.to_string()),
    }
}

impl KozaClient {
    pub fn new(settings: KozaSettings) -> AppResult<Self> {
        // 末尾补 '/'，否则 Url::join 会替换最后一段路径
        let mut base = settings.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| AppError::validation(format!("下游地址无效 {}: {}", base, e)))?;

        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| AppError::internal(format!("创建 HTTP 客户端失败: {}", e)))?;

        let classifier =
            ResponseClassifier::new(&settings.duplicate_markers, &settings.session_expired_codes);

        Ok(Self {
            http,
            base_url,
            settings,
            classifier,
        })
    }

    fn endpoint(&self, path: &str) -> DownstreamResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DownstreamError::Validation(format!("invalid endpoint {}: {}", path, e)))
    }

    /// 发送 JSON POST，返回状态、响应头和响应体
    async fn send<B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> DownstreamResult<(reqwest::StatusCode, HeaderMap, String)> {
        let url = self.endpoint(path)?;
        let mut request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .json(body);
        if let Some(token) = token {
            request = request.header(COOKIE, format!("{}={}", SESSION_COOKIE, token));
        }

        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await.map_err(|e| classify_transport(&e))?;
        debug!(path, status = status.as_u16(), body = %preview(&text), "Koza response");
        Ok((status, headers, text))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> DownstreamResult<Value> {
        let (status, _, text) = self.send(path, Some(token), body).await?;
        self.classifier.classify(status, &text)
    }
}

#[async_trait]
impl DownstreamGateway for KozaClient {
    async fn login(&self) -> DownstreamResult<DownstreamSession> {
        let request = LoginRequest {
            org_code: &self.settings.org_code,
            user_name: &self.settings.username,
            user_password: self.settings.password.expose_secret(),
        };
        let (status, headers, text) = self
            .send(LOGIN_PATH, None, &request)
            .await
            .map_err(as_login_error)?;
        self.classifier
            .classify(status, &text)
            .map_err(as_login_error)?;

        let token = session_cookie(&headers).ok_or_else(|| {
            DownstreamError::Auth(format!("{} cookie missing from login response", SESSION_COOKIE))
        })?;

        if let Some(branch_id) = self.settings.branch_id {
            let branch = BranchSelectRequest {
                org_sirket_sube_id: branch_id,
            };
            self.post(BRANCH_PATH, &token, &branch)
                .await
                .map_err(as_login_error)?;
            info!(branch_id, "Koza branch selected");
        }

        let ttl = chrono::Duration::from_std(self.settings.session_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(20));
        Ok(DownstreamSession {
            token,
            expires_at: Utc::now() + ttl,
        })
    }

    async fn find_by_code(
        &self,
        token: &str,
        code: &CanonicalCode,
    ) -> DownstreamResult<Option<DownstreamId>> {
        let value = self
            .post(LIST_PATH, token, &StockCardListRequest::exact(code.as_str()))
            .await?;

        // 过滤条件是区间匹配，返回的行仍需逐个比对规范化编码
        let found = extract_rows(&value).iter().find_map(|row| {
            let row_code = row_code(row)?;
            (canonicalize(&row_code) == code.as_str())
                .then(|| extract_id(row))
                .flatten()
        });
        Ok(found)
    }

    async fn create(
        &self,
        token: &str,
        payload: &StockCardPayload,
    ) -> DownstreamResult<Option<DownstreamId>> {
        let value = self.post(CREATE_PATH, token, payload).await?;
        Ok(extract_id(&value))
    }

    async fn list_page(
        &self,
        token: &str,
        page: Pagination,
    ) -> DownstreamResult<Vec<DownstreamRecord>> {
        let value = self
            .post(
                LIST_PATH,
                token,
                &StockCardListRequest::page(page.offset(), page.page_size),
            )
            .await?;

        Ok(extract_rows(&value)
            .iter()
            .filter_map(|row| {
                Some(DownstreamRecord {
                    code: row_code(row)?,
                    id: extract_id(row)?,
                })
            })
            .collect())
    }
}
