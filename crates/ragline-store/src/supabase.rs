//! Supabase row store reached through its PostgREST API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ragline_core::config::StoreConfig;
use ragline_core::{
    Chunk, ChunkMetadata, Error, QuerySession, Result, RetrievedChunk, SessionBackend,
    SessionStats, VectorBackend,
};
use reqwest::header::{CONTENT_RANGE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, from_str, from_value};
use std::time::Duration;

use crate::session::summarize;

/// Authenticated PostgREST endpoint shared by both backends.
#[derive(Clone)]
pub struct PostgrestClient {
    client: Client,
    rest_url: String,
}

impl PostgrestClient {
    /// Create a client for the project at `url`, authenticated with `key`.
    ///
    /// # Errors
    /// Returns an error if the key is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(url: &str, key: &str, request_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(key)
            .map_err(|error| Error::Config(format!("Invalid Supabase key: {error}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|error| Error::Config(format!("Invalid Supabase key: {error}")))?;
        headers.insert("apikey", api_key);
        headers.insert("Authorization", bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", url.trim_end_matches('/')),
        })
    }

    /// Build a client from store settings and the environment.
    ///
    /// # Errors
    /// Returns an error if the URL or key is missing.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let url = config
            .url()
            .ok_or_else(|| Error::Config("SUPABASE_URL not set".to_owned()))?;
        let key = config
            .key()
            .ok_or_else(|| Error::Config("SUPABASE_SERVICE_ROLE_KEY not set".to_owned()))?;
        Self::new(&url, &key, Duration::from_millis(config.request_timeout_ms))
    }

    fn table(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_url)
    }

    fn rpc(&self, function: &str) -> String {
        format!("{}/rpc/{function}", self.rest_url)
    }

    async fn send(request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request.send().await.map_err(|error| {
            Error::StorageUnavailable(format!("{what} request failed: {error}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_owned());
            return Err(Error::StorageUnavailable(format!(
                "{what} error {status}: {error_text}"
            )));
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(request: RequestBuilder, what: &str) -> Result<T> {
        Self::send(request, what).await?.json().await.map_err(|error| {
            Error::StorageUnavailable(format!("Malformed {what} response: {error}"))
        })
    }
}

/// PostgREST ids may be text or integer columns.
fn id_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// pgvector columns arrive either as JSON arrays or as `"[0.1,0.2]"` strings.
fn parse_embedding(value: Option<Value>) -> Vec<f32> {
    match value {
        Some(Value::String(text)) => from_str(&text).unwrap_or_default(),
        Some(array @ Value::Array(_)) => from_value(array).unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct ChunkRow {
    id: Value,
    #[serde(default)]
    content: String,
    #[serde(default)]
    metadata: Option<ChunkMetadata>,
    #[serde(default)]
    embedding: Option<Value>,
}

impl From<ChunkRow> for Chunk {
    fn from(row: ChunkRow) -> Self {
        Self {
            id: id_to_string(&row.id),
            text: row.content,
            embedding: parse_embedding(row.embedding),
            metadata: row.metadata.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MatchRow {
    id: Value,
    #[serde(default)]
    content: String,
    #[serde(default)]
    metadata: Option<ChunkMetadata>,
    #[serde(default)]
    similarity: Option<f32>,
    #[serde(default)]
    distance: Option<f32>,
}

#[derive(Debug, Serialize)]
struct UpsertRow<'row> {
    id: &'row str,
    content: &'row str,
    embedding: &'row [f32],
    metadata: &'row ChunkMetadata,
}

#[derive(Debug, Serialize)]
struct MatchParams<'params> {
    query_embedding: &'params [f32],
    match_threshold: f32,
    match_count: usize,
}

/// Chunk rows in a Supabase table, searched through a `match_documents`-style RPC.
pub struct SupabaseVectorBackend {
    client: PostgrestClient,
    table: String,
    match_function: String,
}

impl SupabaseVectorBackend {
    /// Create a backend over `client` using the configured table and function.
    pub fn new(client: PostgrestClient, config: &StoreConfig) -> Self {
        Self {
            client,
            table: config.vector_table.clone(),
            match_function: config.match_function.clone(),
        }
    }
}

#[async_trait]
impl VectorBackend for SupabaseVectorBackend {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn upsert(&self, chunk: &Chunk) -> Result<()> {
        let row = UpsertRow {
            id: &chunk.id,
            content: &chunk.text,
            embedding: &chunk.embedding,
            metadata: &chunk.metadata,
        };
        let request = self
            .client
            .client
            .post(self.client.table(&self.table))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row]);
        PostgrestClient::send(request, "upsert").await?;
        Ok(())
    }

    async fn match_chunks(
        &self,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedChunk>> {
        let params = MatchParams {
            query_embedding: embedding,
            match_threshold: threshold,
            match_count: limit,
        };
        let request = self
            .client
            .client
            .post(self.client.rpc(&self.match_function))
            .json(&params);
        let rows: Vec<MatchRow> = PostgrestClient::json(request, "match").await?;

        rows.into_iter()
            .enumerate()
            .map(|(rank, row)| {
                let similarity = row
                    .similarity
                    .or_else(|| row.distance.map(|distance| 1.0 - distance))
                    .ok_or_else(|| {
                        Error::StorageUnavailable(
                            "Malformed match response: row has neither similarity nor distance"
                                .to_owned(),
                        )
                    })?;
                Ok(RetrievedChunk {
                    chunk: Chunk {
                        id: id_to_string(&row.id),
                        text: row.content,
                        embedding: Vec::new(),
                        metadata: row.metadata.unwrap_or_default(),
                    },
                    similarity: similarity.clamp(-1.0, 1.0),
                    rank,
                })
            })
            .collect()
    }

    async fn fetch_rows(&self, limit: usize) -> Result<Vec<Chunk>> {
        let request = self
            .client
            .client
            .get(self.client.table(&self.table))
            .query(&[
                ("select", "id,content,metadata,embedding".to_owned()),
                ("limit", limit.to_string()),
            ]);
        let rows: Vec<ChunkRow> = PostgrestClient::json(request, "row fetch").await?;
        Ok(rows.into_iter().map(Chunk::from).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>> {
        let request = self
            .client
            .client
            .get(self.client.table(&self.table))
            .query(&[
                ("select", "id,content,metadata,embedding".to_owned()),
                ("id", format!("eq.{id}")),
            ]);
        let rows: Vec<ChunkRow> = PostgrestClient::json(request, "chunk get").await?;
        Ok(rows.into_iter().next().map(Chunk::from))
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let quoted: Vec<String> = ids
            .iter()
            .map(|id| format!("\"{}\"", id.replace('"', "\\\"")))
            .collect();
        let request = self
            .client
            .client
            .delete(self.client.table(&self.table))
            .query(&[
                ("id", format!("in.({})", quoted.join(","))),
                ("select", "id".to_owned()),
            ])
            .header("Prefer", "return=representation");
        let rows: Vec<Value> = PostgrestClient::json(request, "chunk delete").await?;
        Ok(rows.len())
    }

    async fn count(&self) -> Result<usize> {
        let request = self
            .client
            .client
            .get(self.client.table(&self.table))
            .query(&[("select", "id"), ("limit", "1")])
            .header("Prefer", "count=exact");
        let response = PostgrestClient::send(request, "count").await?;

        // Content-Range: 0-0/42
        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(|range| range.rsplit('/').next())
            .and_then(|total| total.parse().ok())
            .ok_or_else(|| {
                Error::StorageUnavailable("count response carried no Content-Range".to_owned())
            })
    }
}

#[derive(Debug, Deserialize)]
struct StatsRow {
    #[serde(default)]
    processing_time_ms: Option<u64>,
    created_at: DateTime<Utc>,
}

/// Session rows in a Supabase table.
pub struct SupabaseSessionBackend {
    client: PostgrestClient,
    table: String,
}

impl SupabaseSessionBackend {
    /// Create a backend over `client` using the configured session table.
    pub fn new(client: PostgrestClient, config: &StoreConfig) -> Self {
        Self {
            client,
            table: config.session_table.clone(),
        }
    }

    fn listing(&self, user_id: Option<&str>, limit: usize) -> RequestBuilder {
        let mut request = self
            .client
            .client
            .get(self.client.table(&self.table))
            .query(&[
                ("select", "*".to_owned()),
                ("order", "created_at.desc".to_owned()),
                ("limit", limit.to_string()),
            ]);
        if let Some(user) = user_id {
            request = request.query(&[("user_id", format!("eq.{user}"))]);
        }
        request
    }
}

#[async_trait]
impl SessionBackend for SupabaseSessionBackend {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn insert(&self, session: &QuerySession) -> Result<()> {
        let request = self
            .client
            .client
            .post(self.client.table(&self.table))
            .header("Prefer", "return=minimal")
            .json(session);
        PostgrestClient::send(request, "session insert").await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<QuerySession>> {
        let request = self
            .client
            .client
            .get(self.client.table(&self.table))
            .query(&[("select", "*".to_owned()), ("id", format!("eq.{id}"))]);
        let rows: Vec<QuerySession> = PostgrestClient::json(request, "session get").await?;
        Ok(rows.into_iter().next())
    }

    async fn list_recent(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QuerySession>> {
        PostgrestClient::json(self.listing(user_id, limit), "session list").await
    }

    async fn search(
        &self,
        user_id: Option<&str>,
        text: &str,
        limit: usize,
    ) -> Result<Vec<QuerySession>> {
        let pattern = text.replace('*', "");
        let request = self
            .listing(user_id, limit)
            .query(&[("query", format!("ilike.*{pattern}*"))]);
        PostgrestClient::json(request, "session search").await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let request = self
            .client
            .client
            .delete(self.client.table(&self.table))
            .query(&[("id", format!("eq.{id}")), ("select", "id".to_owned())])
            .header("Prefer", "return=representation");
        let rows: Vec<Value> = PostgrestClient::json(request, "session delete").await?;
        Ok(!rows.is_empty())
    }

    async fn stats(&self) -> Result<SessionStats> {
        let request = self
            .client
            .client
            .get(self.client.table(&self.table))
            .query(&[("select", "processing_time_ms,created_at")]);
        let rows: Vec<StatsRow> = PostgrestClient::json(request, "session stats").await?;
        Ok(summarize(rows.into_iter().map(|row| {
            (row.processing_time_ms.unwrap_or_default(), row.created_at)
        })))
    }
}
