//! Artifact downloads, converting stored series to JSON or CSV on the fly.

use std::str::FromStr;

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::StreamExt;
use tempfile::TempPath;
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::artifact::{Artifact, ArtifactCategory, ArtifactFormat, MapKind};
use crate::convert::{self, OutputFormat};
use crate::utils::filename::validate_match_id;

/// Create the download router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{match_id}/{type_of_data}", get(download))
}

/// The `typeOfData` path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    PoseJson,
    PoseCsv,
    JointAngles,
    Heatmap,
    Velocity,
    Video,
}

impl FromStr for DownloadKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pose_json" => DownloadKind::PoseJson,
            "pose_csv" => DownloadKind::PoseCsv,
            "jointangles" => DownloadKind::JointAngles,
            "heatmap" => DownloadKind::Heatmap,
            "velocity" => DownloadKind::Velocity,
            "video" => DownloadKind::Video,
            _ => return Err(ApiError::bad_request("Invalid type of data!")),
        })
    }
}

impl DownloadKind {
    fn category(self) -> ArtifactCategory {
        match self {
            DownloadKind::PoseJson | DownloadKind::PoseCsv => ArtifactCategory::PoseData,
            DownloadKind::JointAngles => ArtifactCategory::AnglesData,
            DownloadKind::Heatmap => ArtifactCategory::Map(MapKind::Heatmap),
            DownloadKind::Velocity => ArtifactCategory::VelocityData,
            DownloadKind::Video => ArtifactCategory::Video,
        }
    }

    /// Conversion needed to serve `stored`, if any.
    fn conversion(self, stored: ArtifactFormat) -> Option<OutputFormat> {
        match self {
            DownloadKind::PoseCsv => Some(OutputFormat::Csv),
            DownloadKind::PoseJson | DownloadKind::JointAngles
                if stored != ArtifactFormat::Json =>
            {
                Some(OutputFormat::Json)
            }
            _ => None,
        }
    }
}

async fn download(
    State(state): State<AppState>,
    Path((match_id, type_of_data)): Path<(String, String)>,
) -> ApiResult<Response> {
    let match_id = validate_match_id(&match_id)?;
    let kind: DownloadKind = type_of_data.parse()?;

    let category = kind.category();
    let artifact = state
        .locator
        .locate(match_id, category)
        .await
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    match kind.conversion(artifact.format) {
        None => {
            let file_name = attachment_name(category, match_id, artifact.format);
            let content_type = artifact.format.content_type();
            send_file(&artifact.path, &file_name, content_type, None).await
        }
        Some(output) => {
            let file_name = attachment_name(category, match_id, output.artifact_format());
            let content_type = output.artifact_format().content_type();
            let temp = convert_artifact(&state, artifact, output).await?;
            let path = temp.to_path_buf();
            send_file(&path, &file_name, content_type, Some(temp)).await
        }
    }
}

async fn convert_artifact(
    state: &AppState,
    artifact: Artifact,
    output: OutputFormat,
) -> ApiResult<TempPath> {
    debug!(source = %artifact.path.display(), ?output, "Converting artifact for download");
    Ok(convert::convert_to_temp(artifact, output, state.temp_dir.clone()).await?)
}

fn attachment_name(category: ArtifactCategory, match_id: &str, format: ArtifactFormat) -> String {
    format!("{}_{}.{}", category.slug(), match_id, format.extension())
}

/// Stream `path` as an attachment. A temp file handed in here lives exactly
/// as long as the response body.
async fn send_file(
    path: &std::path::Path,
    file_name: &str,
    content_type: &'static str,
    temp: Option<TempPath>,
) -> ApiResult<Response> {
    let file = tokio::fs::File::open(path).await.map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to open download");
        ApiError::internal("Error reading file.").with_error(e.to_string())
    })?;
    let len = file
        .metadata()
        .await
        .map_err(|e| ApiError::internal("Error reading file.").with_error(e.to_string()))?
        .len();

    let stream = ReaderStream::new(file).map(move |chunk| {
        let _owned = &temp;
        chunk
    });

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
            .map_err(|e| ApiError::internal(format!("Invalid header value: {e}")))?,
    );

    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}
