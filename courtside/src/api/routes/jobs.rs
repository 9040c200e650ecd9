//! Job registry inspection.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Serialize;

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::jobs::JobRecord;
use crate::utils::filename::validate_match_id;

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{match_id}", get(list_jobs))
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub match_id: String,
    pub jobs: Vec<JobRecord>,
}

/// Every analysis this process has seen for a match, with its state.
async fn list_jobs(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> ApiResult<Json<JobListResponse>> {
    let match_id = validate_match_id(&match_id)?;
    Ok(Json(JobListResponse {
        match_id: match_id.to_string(),
        jobs: state.orchestrator.registry().list(match_id),
    }))
}
