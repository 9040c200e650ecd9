//! Source video streaming and first-frame extraction.

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio_util::io::ReaderStream;

use crate::api::error::{ApiError, ApiResult};
use crate::api::range;
use crate::api::server::AppState;
use crate::artifact::ArtifactCategory;
use crate::jobs::FirstFrameOutcome;
use crate::utils::filename::{validate_file_name, validate_match_id};

/// Create the video router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{match_id}/stream", get(stream_video))
        .route("/first-frame/{file_name}", get(first_frame))
}

async fn stream_video(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let match_id = validate_match_id(&match_id)?;
    range::serve(
        &state.locator,
        match_id,
        ArtifactCategory::Video,
        &method,
        &headers,
        state.chunk_size,
    )
    .await
}

/// Run the first-frame worker on an upload still in temp storage and return
/// the extracted image.
async fn first_frame(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> ApiResult<Response> {
    let file_name = validate_file_name(&file_name)?;

    let path = match state.orchestrator.first_frame(file_name).await {
        FirstFrameOutcome::Extracted { path } => path,
        FirstFrameOutcome::Failed(outcome) => return Err(ApiError::from_worker(outcome)),
        FirstFrameOutcome::MissingVideo => {
            return Err(ApiError::internal("Process failed")
                .with_code(Some(1))
                .with_error("Video file not found"));
        }
        FirstFrameOutcome::AlreadyRunning => {
            return Err(ApiError::conflict(format!(
                "Analysis already running for {file_name}"
            )));
        }
    };

    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Failed to open first frame");
        ApiError::internal("Error reading image file.").with_error(e.to_string())
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    Ok((
        StatusCode::OK,
        headers,
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}
