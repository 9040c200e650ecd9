//! API error handling.
//!
//! Every failure leaves the service with a body: JSON `{message, code?, error?}`
//! for most endpoints, plain text for the range streamer.

use axum::{
    Json,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;
use crate::worker::WorkerOutcome;

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub message: String,
    /// Worker exit code, when a worker failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    /// Diagnostic text (worker stderr, IO error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<i32>,
    pub error: Option<String>,
    /// Send `message` as `text/plain` instead of JSON.
    pub plain: bool,
    pub headers: HeaderMap,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
            error: None,
            plain: false,
            headers: HeaderMap::new(),
        }
    }

    /// Plain-text error body.
    pub fn plain(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            plain: true,
            ..Self::new(status, message)
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_code(mut self, code: Option<i32>) -> Self {
        self.code = code;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Create a 404 Not Found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Create a 409 Conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Create a 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Map a worker run that did not succeed.
    pub fn from_worker(outcome: WorkerOutcome) -> Self {
        match outcome {
            WorkerOutcome::Failure { code, error } => ApiError::internal("Process failed")
                .with_code(code)
                .with_error(error),
            WorkerOutcome::StartError { message } => {
                ApiError::internal("Failed to start process").with_error(message)
            }
            WorkerOutcome::TimedOut { error, .. } => {
                ApiError::internal("Process timed out").with_error(error)
            }
            WorkerOutcome::Cancelled => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Process cancelled")
            }
            WorkerOutcome::Success { .. } => {
                tracing::error!("Successful worker outcome mapped to an error");
                ApiError::internal("Unexpected worker outcome")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = if self.plain {
            (self.status, self.message).into_response()
        } else {
            let body = ApiErrorResponse {
                message: self.message,
                code: self.code,
                error: self.error,
            };
            (self.status, Json(body)).into_response()
        };
        response.headers_mut().extend(self.headers);
        response
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { entity_type, id } => {
                ApiError::not_found(format!("{entity_type} not found for {id}"))
            }
            Error::Validation(msg) => ApiError::bad_request(msg),
            Error::Io(_) | Error::IoPath { .. } => {
                tracing::error!(error = %err, "IO error");
                ApiError::internal("Error reading file.").with_error(err.to_string())
            }
            Error::Decode(_) | Error::Csv(_) | Error::Serialization(_) => {
                tracing::error!(error = %err, "Conversion error");
                ApiError::internal("Error converting file.").with_error(err.to_string())
            }
            _ => {
                tracing::error!(error = %err, "Unexpected error");
                ApiError::internal("An unexpected error occurred").with_error(err.to_string())
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_worker_failure_body() {
        let (status, json) = body_json(ApiError::from_worker(WorkerOutcome::Failure {
            code: Some(1),
            error: "boom".to_string(),
        }))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json,
            serde_json::json!({"message": "Process failed", "code": 1, "error": "boom"})
        );
    }

    #[tokio::test]
    async fn test_start_error_and_timeout_bodies() {
        let (_, json) = body_json(ApiError::from_worker(WorkerOutcome::StartError {
            message: "No such file".to_string(),
        }))
        .await;
        assert_eq!(json["message"], "Failed to start process");
        assert!(json.get("code").is_none());

        let (status, json) = body_json(ApiError::from_worker(WorkerOutcome::TimedOut {
            after: Duration::from_secs(5),
            error: String::new(),
        }))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["message"], "Process timed out");
    }

    #[tokio::test]
    async fn test_plain_error_with_header() {
        let response = ApiError::plain(StatusCode::RANGE_NOT_SATISFIABLE, "Range not satisfiable")
            .with_header(
                axum::http::header::CONTENT_RANGE,
                HeaderValue::from_static("bytes */10"),
            )
            .into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_RANGE],
            "bytes */10"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"Range not satisfiable");
    }

    #[test]
    fn test_domain_error_mapping() {
        assert_eq!(
            ApiError::from(Error::validation("bad id")).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(Error::not_found("Video", "m1")).status,
            StatusCode::NOT_FOUND
        );
        let io = Error::Io(std::io::Error::other("disk"));
        assert_eq!(ApiError::from(io).status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
