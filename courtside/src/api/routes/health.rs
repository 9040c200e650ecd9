//! Health check routes.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::api::server::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub workers: WorkerStats,
}

#[derive(Debug, Serialize)]
pub struct WorkerStats {
    pub active: usize,
    pub max: usize,
    pub spawned: usize,
}

/// Liveness plus worker-pool counters.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let runner = state.runner();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        workers: WorkerStats {
            active: runner.active_count(),
            max: runner.max_workers(),
            spawned: runner.spawn_count(),
        },
    })
}
