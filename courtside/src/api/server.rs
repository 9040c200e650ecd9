//! API server setup and configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::artifact::ArtifactLocator;
use crate::config::{AppConfig, ServerConfig};
use crate::error::{Error, Result};
use crate::jobs::{JobRegistry, Orchestrator};
use crate::matches::{FileMatchRepository, MatchRepository};
use crate::worker::JobRunner;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Artifact lookup over the storage root
    pub locator: Arc<ArtifactLocator>,
    /// Analysis job orchestration
    pub orchestrator: Orchestrator,
    /// Bytes per range window
    pub chunk_size: u64,
    /// Where converted downloads are staged
    pub temp_dir: PathBuf,
}

impl AppState {
    /// Build the service graph from configuration.
    ///
    /// Match context is read from `{storage_root}/matches`.
    pub fn from_config(config: &AppConfig) -> Self {
        let matches = Arc::new(FileMatchRepository::new(config.storage_root.join("matches")));
        Self::with_match_repository(config, matches)
    }

    pub fn with_match_repository(config: &AppConfig, matches: Arc<dyn MatchRepository>) -> Self {
        let locator = Arc::new(ArtifactLocator::new(&config.storage_root));
        let runner = Arc::new(JobRunner::new(&config.worker));
        let orchestrator =
            Orchestrator::new(Arc::clone(&locator), runner, JobRegistry::new(), matches);
        Self {
            start_time: Instant::now(),
            locator,
            orchestrator,
            chunk_size: config.chunk_size,
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn runner(&self) -> &Arc<JobRunner> {
        self.orchestrator.runner()
    }
}

/// The HTTP server.
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router.layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if req.uri().path().starts_with("/health") {
                        Span::none()
                    } else {
                        let mut make_span =
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                        use tower_http::trace::MakeSpan;
                        make_span.make_span(req)
                    }
                })
                .on_request(|req: &Request, span: &Span| {
                    if span.is_disabled() {
                        return;
                    }
                    let mut on_request =
                        tower_http::trace::DefaultOnRequest::new().level(tracing::Level::INFO);
                    use tower_http::trace::OnRequest;
                    on_request.on_request(req, span);
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let on_response =
                            tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO);
                        use tower_http::trace::OnResponse;
                        on_response.on_response(res, latency, span);
                    },
                ),
        )
    }

    /// Serve until the cancel token fires, then stop every running worker.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::config(format!("Invalid address: {e}")))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await;

        let active = self.state.runner().active_count();
        if active > 0 {
            tracing::warn!(active, "Killing running analysis workers");
        }
        self.state.runner().shutdown();

        result.map_err(|e| Error::Other(format!("Server error: {e}")))
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
