//! Analysis-type registration and lookup API

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::RegistryResult;
use crate::model::AnalysisType;
use crate::pagination::{calculate_pagination, PAGE_SIZE};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub schema: serde_json::Value,
    #[serde(default)]
    pub file_types: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub name: String,
    pub version: u32,
}

/// POST /schemas
///
/// Registers a new version of the named analysis type.
pub async fn register_analysis_type(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> RegistryResult<Json<RegisterResponse>> {
    let registered = state
        .schemas
        .register(&request.name, &request.schema, request.file_types.as_deref())
        .await?;

    Ok(Json(RegisterResponse {
        name: registered.name,
        version: registered.version,
    }))
}

/// GET /schemas/:id
///
/// Resolves the canonical `name:version` form.
pub async fn get_analysis_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> RegistryResult<Json<AnalysisType>> {
    let analysis_type = state.schemas.resolve_canonical(&id).await?;
    Ok(Json(analysis_type))
}

/// Query parameters for the analysis-type listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Comma-separated names
    pub names: Option<String>,
    /// Comma-separated versions
    pub versions: Option<String>,
    #[serde(default)]
    pub hide_schema: bool,
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub analysis_types: Vec<AnalysisType>,
}

/// GET /schemas
///
/// Paged listing with optional name/version filters and schema hiding.
pub async fn list_analysis_types(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> RegistryResult<Json<ListResponse>> {
    let names: Option<Vec<String>> = query
        .names
        .map(|names| names.split(',').map(str::to_string).collect());
    let versions: Option<Vec<u32>> = query
        .versions
        .map(|versions| {
            versions
                .split(',')
                .map(|v| {
                    v.parse().map_err(|_| {
                        crate::error::RegistryError::MalformedParameter(format!(
                            "'{}' is not a valid version",
                            v
                        ))
                    })
                })
                .collect()
        })
        .transpose()?;

    let (total, _) = state
        .schemas
        .list(names.as_deref(), versions.as_deref(), true, 0, 0)
        .await?;
    let pagination = calculate_pagination(total, query.page);

    let (_, analysis_types) = state
        .schemas
        .list(
            names.as_deref(),
            versions.as_deref(),
            query.hide_schema,
            PAGE_SIZE,
            pagination.offset,
        )
        .await?;

    Ok(Json(ListResponse {
        total,
        page: pagination.page,
        page_size: PAGE_SIZE,
        total_pages: pagination.total_pages,
        analysis_types,
    }))
}
