use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;

use super::ApiError;
use crate::application::{MappingQueries, SessionManager, SessionStats};
use crate::domain::entities::ProductMapping;
use crate::domain::value_objects::SourceProductId;
use crate::infrastructure::cache::{CacheStatus, CodeCache};

#[derive(Clone)]
pub struct DiagnosticsState {
    pub sessions: Arc<SessionManager>,
    pub cache: Arc<CodeCache>,
    pub queries: Arc<MappingQueries>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
}

/// 诊断路由
///
/// 静态路径优先于 `{source_id}` 匹配，所以 `/mappings/pending` 不会被当成产品 id
pub fn router(state: DiagnosticsState) -> Router {
    Router::new()
        .route("/diagnostics/session", get(session_stats))
        .route("/diagnostics/cache", get(cache_status))
        .route("/mappings/pending", get(pending_mappings))
        .route("/mappings/failed", get(failed_mappings))
        .route("/mappings/{source_id}", get(mapping_status))
        .route("/mappings/{source_id}/history", get(mapping_history))
        .with_state(state)
}

async fn session_stats(State(state): State<DiagnosticsState>) -> Json<SessionStats> {
    Json(state.sessions.get_stats())
}

async fn cache_status(State(state): State<DiagnosticsState>) -> Json<CacheStatus> {
    Json(state.cache.status().await)
}

async fn pending_mappings(
    State(state): State<DiagnosticsState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ProductMapping>>, ApiError> {
    Ok(Json(state.queries.get_pending_mappings(params.limit).await?))
}

async fn failed_mappings(
    State(state): State<DiagnosticsState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ProductMapping>>, ApiError> {
    Ok(Json(state.queries.get_failed_mappings(params.limit).await?))
}

async fn mapping_status(
    State(state): State<DiagnosticsState>,
    Path(source_id): Path<String>,
) -> Result<Json<ProductMapping>, ApiError> {
    let source_id = SourceProductId::new(source_id);
    Ok(Json(state.queries.get_mapping_status(&source_id).await?))
}

async fn mapping_history(
    State(state): State<DiagnosticsState>,
    Path(source_id): Path<String>,
) -> Result<Json<Vec<ProductMapping>>, ApiError> {
    let source_id = SourceProductId::new(source_id);
    Ok(Json(state.queries.get_mapping_history(&source_id).await?))
}
