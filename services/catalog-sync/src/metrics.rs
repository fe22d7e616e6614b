//! 同步引擎指标

use metrics::{counter, histogram};

/// 记录一次 upsert 结果（synced / failed / cancelled）
pub fn record_upsert(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!("catalog_sync_upserts_total", &labels).increment(1);
}

/// 记录一次下游调用
pub fn record_downstream_call(operation: &str, result: &str) {
    let labels = [
        ("operation", operation.to_string()),
        ("result", result.to_string()),
    ];
    counter!("catalog_sync_downstream_calls_total", &labels).increment(1);
}

/// 记录一次重试
pub fn record_retry(class: &str) {
    let labels = [("class", class.to_string())];
    counter!("catalog_sync_retries_total", &labels).increment(1);
}

/// 记录缓存操作
pub fn record_cache_operation(operation: &str, hit: bool) {
    let labels = [
        ("operation", operation.to_string()),
        ("hit", hit.to_string()),
    ];
    counter!("catalog_sync_cache_operations_total", &labels).increment(1);
}

/// 记录缓存不可用
pub fn record_cache_unavailable() {
    counter!("catalog_sync_cache_unavailable_total").increment(1);
}

/// 记录登录结果
pub fn record_session_login(success: bool) {
    let labels = [(
        "result",
        if success { "success" } else { "failure" }.to_string(),
    )];
    counter!("catalog_sync_session_logins_total", &labels).increment(1);
}

/// 记录批次耗时
pub fn record_batch_duration(duration_ms: f64) {
    histogram!("catalog_sync_batch_duration_ms").record(duration_ms);
}
