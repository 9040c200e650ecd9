//! Player shirt-colour detection.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::ProcessResponse;
use crate::api::server::AppState;
use crate::jobs::{AnalysisOutcome, JobKind};
use crate::utils::filename::validate_match_id;
use crate::worker::WorkerOutcome;

/// Create the colour router.
pub fn router() -> Router<AppState> {
    Router::new().route("/players/{match_id}", get(player_colours))
}

/// Run k-means colour clustering on the match video and return the worker's
/// answer with line breaks removed.
async fn player_colours(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> ApiResult<Json<ProcessResponse>> {
    let match_id = validate_match_id(&match_id)?;
    match state.orchestrator.request(match_id, JobKind::Players).await {
        AnalysisOutcome::Ran(WorkerOutcome::Success { output }) => Ok(Json(ProcessResponse {
            message: "Process completed",
            output: output.replace(['\r', '\n'], ""),
        })),
        AnalysisOutcome::Ran(outcome) => Err(ApiError::from_worker(outcome)),
        AnalysisOutcome::AlreadyRunning => Err(ApiError::conflict(format!(
            "Analysis already running for {match_id}"
        ))),
        AnalysisOutcome::MissingInput(missing) => Err(ApiError::bad_request(missing.message())),
        AnalysisOutcome::AlreadyStored { .. } => Err(ApiError::conflict(format!(
            "Data already stored for {match_id}"
        ))),
    }
}
