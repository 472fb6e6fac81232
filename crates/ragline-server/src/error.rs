//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ragline_core::Error;
use serde_json::json;

/// Error returned by a handler, rendered as `{"detail": ...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    /// Error with an explicit status.
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// 400
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    /// 404
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    /// 503 for requests that need the pipeline before it exists.
    pub fn not_initialized() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "pipeline not initialized")
    }

    /// Status code of the response
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Message of the response
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(detail) => Self::bad_request(detail),
            Error::NotFound(_) => Self::not_found("session not found"),
            Error::StorageUnavailable(_) => unavailable(&err, "storage unavailable"),
            Error::EmbeddingUnavailable(_) => unavailable(&err, "embedding unavailable"),
            Error::GenerationUnavailable(_) => unavailable(&err, "generation unavailable"),
            Error::Timeout(_) => unavailable(&err, "request timed out"),
            other => {
                tracing::error!(error = %other, "request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

fn unavailable(err: &Error, detail: &str) -> ApiError {
    tracing::warn!(error = %err, "dependency unavailable");
    ApiError::new(StatusCode::SERVICE_UNAVAILABLE, detail)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_statuses() {
        let validation = ApiError::from(Error::Validation("query is required".to_owned()));
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(validation.detail(), "query is required");

        let missing = ApiError::from(Error::NotFound("s1".to_owned()));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.detail(), "session not found");

        let storage = ApiError::from(Error::StorageUnavailable("down".to_owned()));
        assert_eq!(storage.status(), StatusCode::SERVICE_UNAVAILABLE);

        let other = ApiError::from(Error::Config("bad table name".to_owned()));
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
