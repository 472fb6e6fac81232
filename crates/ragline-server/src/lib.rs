//! HTTP/JSON surface for the ragline pipeline.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::missing_panics_doc,
        reason = "Test allows"
    )
)]

/// Shared state and router assembly.
pub mod app;
/// HTTP error responses.
pub mod error;
/// Logging bootstrap.
pub mod logging;
/// Request handlers.
pub mod routes;

pub use app::{AppState, build_router};
pub use error::ApiError;
pub use logging::init_tracing;
