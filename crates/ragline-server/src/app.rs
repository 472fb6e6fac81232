//! Shared state and router assembly.

use crate::error::ApiError;
use crate::routes;
use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use ragline_pipeline::Pipeline;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// State shared by every handler.
#[derive(Clone, Default)]
pub struct AppState {
    pipeline: Option<Arc<Pipeline>>,
}

impl AppState {
    /// State serving `pipeline`.
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Some(Arc::new(pipeline)),
        }
    }

    /// State for a server whose pipeline failed to start; only `/health`
    /// answers successfully.
    pub fn uninitialized() -> Self {
        Self::default()
    }

    /// Whether a pipeline is available
    pub fn is_initialized(&self) -> bool {
        self.pipeline.is_some()
    }

    /// The pipeline, or a 503.
    ///
    /// # Errors
    /// Returns [`ApiError::not_initialized`] when there is no pipeline.
    pub fn pipeline(&self) -> Result<&Pipeline, ApiError> {
        self.pipeline.as_deref().ok_or_else(ApiError::not_initialized)
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
        .collect();
    if allowed.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(allowed)
    }
}

/// Build the router with every route, CORS for `cors_origins` (any origin
/// when empty) and request tracing.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/query", post(routes::query))
        .route(
            "/session/{id}",
            get(routes::get_session).delete(routes::delete_session),
        )
        .route("/sessions", get(routes::list_sessions))
        .route("/sessions/search", get(routes::search_sessions))
        .route("/sessions/stats", get(routes::session_stats))
        .route("/health", get(routes::health))
        .route("/info", get(routes::info))
        .route("/chunks", get(routes::chunks))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
