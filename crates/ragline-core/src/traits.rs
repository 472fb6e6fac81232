use async_trait::async_trait;

use crate::Result;
use crate::types::{Chunk, QuerySession, RetrievedChunk, SessionStats};

/// Text-to-vector model behind the embedding client.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Embed a single text.
    ///
    /// # Errors
    /// Returns an error if the upstream call fails or the response is malformed.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Prompt handed to a generation provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Fixed instruction describing how the model should answer
    pub system_instruction: String,
    /// Context and question
    pub prompt: String,
}

impl GenerationRequest {
    /// Create a new request.
    pub fn new(system_instruction: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            prompt: prompt.into(),
        }
    }
}

/// Text generation model behind the answer generator.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Generate text for a prompt.
    ///
    /// # Errors
    /// Returns an error if the upstream call fails or the response is malformed.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Row store holding chunks and their embeddings.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Insert or replace a chunk by id.
    ///
    /// # Errors
    /// Returns an error if the row store rejects the write.
    async fn upsert(&self, chunk: &Chunk) -> Result<()>;

    /// Server-side ranked similarity search.
    ///
    /// Returns at most `limit` chunks with similarity `>= threshold`, best first.
    ///
    /// # Errors
    /// Returns an error if the similarity function is missing or fails.
    async fn match_chunks(
        &self,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Plain row fetch in store order, embeddings included when available.
    ///
    /// # Errors
    /// Returns an error if the rows cannot be read.
    async fn fetch_rows(&self, limit: usize) -> Result<Vec<Chunk>>;

    /// Fetch a chunk by id.
    ///
    /// # Errors
    /// Returns an error if the row store cannot be read.
    async fn get(&self, id: &str) -> Result<Option<Chunk>>;

    /// Delete chunks by id, returning how many rows were removed.
    ///
    /// # Errors
    /// Returns an error if the row store rejects the delete.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Number of stored chunks.
    ///
    /// # Errors
    /// Returns an error if the row store cannot be read.
    async fn count(&self) -> Result<usize>;
}

/// Row store holding query sessions.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Insert a new session.
    ///
    /// # Errors
    /// Returns an error if the row store rejects the write.
    async fn insert(&self, session: &QuerySession) -> Result<()>;

    /// Fetch a session by id.
    ///
    /// # Errors
    /// Returns an error if the row store cannot be read.
    async fn get(&self, id: &str) -> Result<Option<QuerySession>>;

    /// Most recent sessions first, optionally filtered by user.
    ///
    /// # Errors
    /// Returns an error if the row store cannot be read.
    async fn list_recent(&self, user_id: Option<&str>, limit: usize)
    -> Result<Vec<QuerySession>>;

    /// Case-insensitive substring search over query text, newest first.
    ///
    /// # Errors
    /// Returns an error if the row store cannot be read.
    async fn search(
        &self,
        user_id: Option<&str>,
        text: &str,
        limit: usize,
    ) -> Result<Vec<QuerySession>>;

    /// Delete a session, returning whether it existed.
    ///
    /// # Errors
    /// Returns an error if the row store rejects the delete.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Aggregate statistics over all sessions.
    ///
    /// # Errors
    /// Returns an error if the row store cannot be read.
    async fn stats(&self) -> Result<SessionStats>;
}
