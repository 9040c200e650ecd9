//! API route modules.
//!
//! Organizes routes by resource type.

pub mod colour;
pub mod download;
pub mod health;
pub mod jobs;
pub mod pose;
pub mod video;

use axum::Router;
use serde::Serialize;

use crate::api::server::AppState;

/// Body of a successful worker-backed request.
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub message: &'static str,
    pub output: String,
}

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/video", video::router())
        .nest("/pose", pose::router())
        .nest("/download", download::router())
        .nest("/colour", colour::router())
        .nest("/jobs", jobs::router())
        .nest("/health", health::router())
        .with_state(state)
}
