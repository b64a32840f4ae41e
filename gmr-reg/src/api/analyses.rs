//! Analysis lifecycle and read API

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::RegistryResult;
use crate::model::{Analysis, AnalysisState};
use crate::pagination::{calculate_pagination, PAGE_SIZE};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishQuery {
    /// Skip checksum comparison for files with undefined checksums
    #[serde(default)]
    pub ignore_undefined_md5: bool,
}

fn state_response(analysis_id: String, state: AnalysisState) -> Json<Value> {
    Json(json!({
        "analysisId": analysis_id,
        "state": state,
    }))
}

/// PUT /studies/:study_id/analyses/:analysis_id/publish
pub async fn publish_analysis(
    State(state): State<AppState>,
    Path((study_id, analysis_id)): Path<(String, String)>,
    Query(query): Query<PublishQuery>,
) -> RegistryResult<Json<Value>> {
    let new_state = state
        .lifecycle
        .publish(&study_id, &analysis_id, query.ignore_undefined_md5)
        .await?;
    Ok(state_response(analysis_id, new_state))
}

/// PUT /studies/:study_id/analyses/:analysis_id/unpublish
pub async fn unpublish_analysis(
    State(state): State<AppState>,
    Path((study_id, analysis_id)): Path<(String, String)>,
) -> RegistryResult<Json<Value>> {
    let new_state = state.lifecycle.unpublish(&study_id, &analysis_id).await?;
    Ok(state_response(analysis_id, new_state))
}

/// PUT /studies/:study_id/analyses/:analysis_id/suppress
pub async fn suppress_analysis(
    State(state): State<AppState>,
    Path((study_id, analysis_id)): Path<(String, String)>,
) -> RegistryResult<Json<Value>> {
    let new_state = state.lifecycle.suppress(&study_id, &analysis_id).await?;
    Ok(state_response(analysis_id, new_state))
}

/// GET /studies/:study_id/analyses/:analysis_id
///
/// Deep read: analysis, files, composite sample tree, state history.
pub async fn deep_read_analysis(
    State(state): State<AppState>,
    Path((study_id, analysis_id)): Path<(String, String)>,
) -> RegistryResult<Json<crate::model::AnalysisDetail>> {
    let detail = state.lifecycle.deep_read(&study_id, &analysis_id).await?;
    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisListResponse {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub analyses: Vec<Analysis>,
}

/// GET /studies/:study_id/analyses
pub async fn list_analyses(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> RegistryResult<Json<AnalysisListResponse>> {
    let (total, _) = state.lifecycle.list_for_study(&study_id, 0, 0).await?;
    let pagination = calculate_pagination(total, query.page);

    let (_, analyses) = state
        .lifecycle
        .list_for_study(&study_id, PAGE_SIZE, pagination.offset)
        .await?;

    Ok(Json(AnalysisListResponse {
        total,
        page: pagination.page,
        page_size: PAGE_SIZE,
        total_pages: pagination.total_pages,
        analyses,
    }))
}
