//! Submission API

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::RegistryResult;
use crate::submit::SubmitReceipt;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuery {
    /// Reuse an already-committed analysis ID instead of failing
    #[serde(default)]
    pub ignore_collisions: bool,
}

/// POST /submit/:study_id
///
/// The body is taken as raw text so that malformed JSON surfaces as a
/// payload-parsing error rather than a framework rejection.
pub async fn submit_payload(
    State(state): State<AppState>,
    Path(study_id): Path<String>,
    Query(query): Query<SubmitQuery>,
    body: String,
) -> RegistryResult<Json<SubmitReceipt>> {
    let receipt = state
        .submissions
        .submit(&study_id, &body, query.ignore_collisions)
        .await?;
    Ok(Json(receipt))
}
