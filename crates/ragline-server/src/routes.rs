//! Request handlers.

use crate::app::AppState;
use crate::error::ApiError;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ragline_core::{ChunkMetadata, QuerySession, SessionStats, SessionSummary};
use ragline_pipeline::{PipelineResponse, QueryRequest, RetrievalReport};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const DEFAULT_LIST_LIMIT: usize = 10;
const MAX_LIST_LIMIT: usize = 100;

/// One chunk as returned by `POST /query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkView {
    /// Chunk text
    pub document: String,
    /// Chunk metadata
    pub metadata: ChunkMetadata,
}

/// Body of a `POST /query` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponseBody {
    /// Answer text
    pub answer: String,
    /// Chunks the answer was built from
    pub chunks: Vec<ChunkView>,
    /// Stored session id, if the session was stored
    pub session_id: Option<String>,
    /// Wall time of the request
    pub processing_time_ms: u64,
    /// Whether the fallback answer was returned
    pub error_fallback: bool,
    /// Whether retrieval went through the degraded path
    pub degraded: bool,
    /// Correlation id of the request's log lines
    pub correlation_id: String,
}

impl From<PipelineResponse> for QueryResponseBody {
    fn from(response: PipelineResponse) -> Self {
        Self {
            answer: response.answer,
            chunks: response
                .chunks
                .into_iter()
                .map(|ranked| ChunkView {
                    document: ranked.chunk.text,
                    metadata: ranked.chunk.metadata,
                })
                .collect(),
            session_id: response.session_id,
            processing_time_ms: response.processing_time_ms,
            error_fallback: response.error_fallback,
            degraded: response.degraded,
            correlation_id: response.correlation_id.to_string(),
        }
    }
}

/// `?user_id=&limit=`
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    user_id: Option<String>,
    limit: Option<usize>,
}

/// `?q=&user_id=&limit=`
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default, rename = "q")]
    text: String,
    user_id: Option<String>,
    limit: Option<usize>,
}

/// `?query=&max_chunks=`
#[derive(Debug, Default, Deserialize)]
pub struct ChunksParams {
    #[serde(default)]
    query: String,
    max_chunks: Option<usize>,
}

fn list_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// `POST /query`
///
/// # Errors
/// 400 for malformed JSON or a blank query, 503 when the pipeline is not
/// initialized.
pub async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponseBody>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::bad_request(format!("invalid request body: {}", rejection.body_text()))
    })?;
    if request.query.trim().is_empty() {
        return Err(ApiError::bad_request("query is required"));
    }

    let pipeline = state.pipeline()?;
    let response = pipeline.answer(request).await?;
    Ok(Json(response.into()))
}

/// `GET /session/{id}`
///
/// # Errors
/// 404 when the session does not exist, 503 when storage is unreachable.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QuerySession>, ApiError> {
    let session = state.pipeline()?.sessions().get(&id).await?;
    Ok(Json(session))
}

/// `DELETE /session/{id}`
///
/// # Errors
/// 404 when the session does not exist, 503 when storage is unreachable.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if state.pipeline()?.sessions().delete(&id).await? {
        Ok(Json(json!({ "deleted": true })))
    } else {
        Err(ApiError::not_found("session not found"))
    }
}

/// `GET /sessions`
///
/// # Errors
/// 503 when storage is unreachable.
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let sessions: Vec<SessionSummary> = state
        .pipeline()?
        .sessions()
        .list_recent(params.user_id.as_deref(), list_limit(params.limit))
        .await?;
    Ok(Json(json!({ "sessions": sessions })))
}

/// `GET /sessions/search`
///
/// # Errors
/// 400 without `q`, 503 when storage is unreachable.
pub async fn search_sessions(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    if params.text.trim().is_empty() {
        return Err(ApiError::bad_request("q is required"));
    }
    let sessions = state
        .pipeline()?
        .sessions()
        .search(params.user_id.as_deref(), params.text.trim(), list_limit(params.limit))
        .await?;
    Ok(Json(json!({ "query": params.text, "sessions": sessions })))
}

/// `GET /sessions/stats`
///
/// # Errors
/// 503 when storage is unreachable.
pub async fn session_stats(State(state): State<AppState>) -> Result<Json<SessionStats>, ApiError> {
    Ok(Json(state.pipeline()?.sessions().stats().await?))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Response {
    let initialized = state.is_initialized();
    let body = Json(json!({
        "status": if initialized { "healthy" } else { "unhealthy" },
        "service": "ragline",
        "pipeline_initialized": initialized,
    }));
    if initialized {
        body.into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}

/// `GET /info`
///
/// # Errors
/// 503 when the pipeline is not initialized.
pub async fn info(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let info = state.pipeline()?.info();
    Ok(Json(json!({ "system_info": info })))
}

/// `GET /chunks`: retrieval and reranking only.
///
/// # Errors
/// 400 without `query`, 503 when retrieval cannot run at all.
pub async fn chunks(
    State(state): State<AppState>,
    Query(params): Query<ChunksParams>,
) -> Result<Json<RetrievalReport>, ApiError> {
    if params.query.trim().is_empty() {
        return Err(ApiError::bad_request("query is required"));
    }
    let report = state
        .pipeline()?
        .retrieve(&params.query, params.max_chunks)
        .await?;
    Ok(Json(report))
}
