//! Koza 响应分类
//!
//! Koza 在会话过期时经常返回 200 + HTML 登录页，业务错误则是 200 + `{"error": true}`。
//! 这里把 HTTP 状态和响应体统一归入 `DownstreamError` 的几个类别。

use reqwest::StatusCode;
use serde_json::Value;

use crate::domain::gateways::DownstreamError;
use crate::domain::value_objects::{DownstreamId, canonicalize};

const ID_KEYS: &[&str] = &["skartId", "stokKartId", "id"];
const LIST_KEYS: &[&str] = &["list", "stokKartlari", "stkKartListesi"];
const CODE_KEYS: &[&str] = &["kartKodu", "kod"];
const MESSAGE_KEYS: &[&str] = &["message", "mesaj", "msg", "errorMessage"];
const NESTED_KEYS: &[&str] = &["data", "stkSkart"];

/// 日志中保留的响应片段长度
const PREVIEW_CHARS: usize = 200;

/// 分类规则
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    /// 已规范化的重复提示语
    duplicate_markers: Vec<String>,
    session_expired_codes: Vec<i64>,
}

pub fn preview(body: &str) -> String {
    body.chars().take(PREVIEW_CHARS).collect()
}

fn looks_like_html(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with('<') || trimmed.to_ascii_lowercase().contains("<!doctype")
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn first_string<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// 读取记录 ID（顶层或 `data` / `stkSkart` 下）
pub fn extract_id(value: &Value) -> Option<DownstreamId> {
    let direct = ID_KEYS
        .iter()
        .find_map(|k| value.get(*k).and_then(as_i64))
        .filter(|id| *id > 0);
    direct.map(DownstreamId).or_else(|| {
        NESTED_KEYS
            .iter()
            .filter_map(|k| value.get(*k))
            .filter(|v| v.is_object())
            .find_map(extract_id)
    })
}

/// 读取列表行
pub fn extract_rows(value: &Value) -> Vec<Value> {
    if let Value::Array(rows) = value {
        return rows.clone();
    }
    for key in LIST_KEYS {
        if let Some(Value::Array(rows)) = value.get(*key) {
            return rows.clone();
        }
    }
    match value.get("data") {
        Some(nested @ (Value::Array(_) | Value::Object(_))) => extract_rows(nested),
        _ => Vec::new(),
    }
}

/// 读取行的卡片编码
pub fn row_code(row: &Value) -> Option<String> {
    first_string(row, CODE_KEYS).map(str::to_string)
}

impl ResponseClassifier {
    pub fn new(duplicate_markers: &[String], session_expired_codes: &[i64]) -> Self {
        Self {
            duplicate_markers: duplicate_markers
                .iter()
                .map(|m| canonicalize(m))
                .filter(|m| !m.is_empty())
                .collect(),
            session_expired_codes: session_expired_codes.to_vec(),
        }
    }

    fn is_duplicate(&self, message: &str) -> bool {
        let message = canonicalize(message);
        self.duplicate_markers.iter().any(|m| message.contains(m.as_str()))
    }

    /// 分类一个 HTTP 响应，成功时返回解析后的 JSON
    pub fn classify(&self, status: StatusCode, body: &str) -> Result<Value, DownstreamError> {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DownstreamError::BadSessionOrResponse(format!("HTTP {}", status)));
        }
        if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            return Err(DownstreamError::Transient(format!(
                "HTTP {}: {}",
                status,
                preview(body)
            )));
        }
        if status == StatusCode::CONFLICT {
            // 409 的响应体可能为空或是纯文本，能解析时才读取已有 ID
            let existing_id = serde_json::from_str::<Value>(body)
                .ok()
                .as_ref()
                .and_then(extract_id);
            return Err(DownstreamError::Conflict {
                existing_id,
                message: format!("HTTP {}: {}", status, preview(body.trim())),
            });
        }
        if body.trim().is_empty() {
            return Err(DownstreamError::Transient(format!("HTTP {} with empty body", status)));
        }
        if looks_like_html(body) {
            return Err(DownstreamError::BadSessionOrResponse(format!(
                "HTML response: {}",
                preview(body)
            )));
        }

        let value: Value = serde_json::from_str(body).map_err(|e| {
            DownstreamError::BadSessionOrResponse(format!("non-JSON response ({}): {}", e, preview(body)))
        })?;

        if let Some(err) = self.business_error(&value) {
            return Err(err);
        }
        if !status.is_success() {
            return Err(DownstreamError::Validation(format!(
                "HTTP {}: {}",
                status,
                preview(body)
            )));
        }
        Ok(value)
    }

    fn business_error(&self, value: &Value) -> Option<DownstreamError> {
        let flagged = value.get("error").and_then(Value::as_bool).unwrap_or(false);
        let code = value.get("code").and_then(as_i64).filter(|c| *c != 0);
        if !flagged && code.is_none() {
            return None;
        }

        let message = first_string(value, MESSAGE_KEYS)
            .map(str::to_string)
            .unwrap_or_else(|| format!("error code {}", code.unwrap_or_default()));

        if code.is_some_and(|c| self.session_expired_codes.contains(&c)) {
            return Some(DownstreamError::BadSessionOrResponse(message));
        }
        if self.is_duplicate(&message) {
            return Some(DownstreamError::Conflict {
                existing_id: extract_id(value),
                message,
            });
        }
        Some(DownstreamError::Validation(message))
    }
}

/// 传输层错误分类
pub fn classify_transport(error: &reqwest::Error) -> DownstreamError {
    if error.is_builder() {
        return DownstreamError::Validation(format!("invalid request: {}", error));
    }
    DownstreamError::Transient(error.to_string())
}
