//! Analysis triggers: pose estimation, joint angles, wrist velocity and
//! court maps, plus streaming of the rendered pose video.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::range;
use crate::api::routes::ProcessResponse;
use crate::api::server::AppState;
use crate::artifact::{ArtifactCategory, Hand, MapKind};
use crate::jobs::{AnalysisOutcome, JobKind};
use crate::utils::filename::validate_match_id;
use crate::worker::WorkerOutcome;

/// Create the pose router.
///
/// Map routes are registered per kind so they do not shadow
/// `/{match_id}/stream`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{match_id}", get(pose_estimation))
        .route("/{match_id}/stream", get(stream_pose_video))
        .route("/angles/{match_id}", get(joint_angles))
        .route("/velocity/{match_id}/{hand}", get(velocity))
        .route("/display2dMap/{match_id}", get(display_map))
        .route("/animated2dMap/{match_id}", get(animated_map))
        .route("/visualizeHeatmap/{match_id}", get(heatmap))
}

async fn pose_estimation(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> ApiResult<Response> {
    run_analysis(&state, &match_id, JobKind::Pose).await
}

async fn joint_angles(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> ApiResult<Response> {
    run_analysis(&state, &match_id, JobKind::Angles).await
}

async fn velocity(
    State(state): State<AppState>,
    Path((match_id, hand)): Path<(String, String)>,
) -> ApiResult<Response> {
    let hand: Hand = hand.parse()?;
    run_analysis(&state, &match_id, JobKind::Velocity(hand)).await
}

async fn display_map(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> ApiResult<Response> {
    run_analysis(&state, &match_id, JobKind::Map(MapKind::Display)).await
}

async fn animated_map(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> ApiResult<Response> {
    run_analysis(&state, &match_id, JobKind::Map(MapKind::Animated)).await
}

async fn heatmap(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> ApiResult<Response> {
    run_analysis(&state, &match_id, JobKind::Map(MapKind::Heatmap)).await
}

async fn stream_pose_video(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let match_id = validate_match_id(&match_id)?;
    range::serve(
        &state.locator,
        match_id,
        ArtifactCategory::PoseOutputVideo,
        &method,
        &headers,
        state.chunk_size,
    )
    .await
}

async fn run_analysis(state: &AppState, match_id: &str, kind: JobKind) -> ApiResult<Response> {
    let match_id = validate_match_id(match_id)?;
    match state.orchestrator.request(match_id, kind).await {
        AnalysisOutcome::Ran(WorkerOutcome::Success { output }) => Ok((
            StatusCode::OK,
            Json(ProcessResponse {
                message: "Finished",
                output,
            }),
        )
            .into_response()),
        AnalysisOutcome::Ran(outcome) => Err(ApiError::from_worker(outcome)),
        AnalysisOutcome::AlreadyStored { .. } => Err(ApiError::conflict(format!(
            "Data already stored for {match_id}"
        ))),
        AnalysisOutcome::AlreadyRunning => Err(ApiError::conflict(format!(
            "Analysis already running for {match_id}"
        ))),
        AnalysisOutcome::MissingInput(missing) => Err(ApiError::bad_request(missing.message())),
    }
}
