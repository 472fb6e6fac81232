//! Request orchestration: variants, embedding, retrieval, reranking,
//! generation and persistence under one global timeout.

use crate::generator::AnswerGenerator;
use chrono::Utc;
use futures::future::join_all;
use ragline_core::config::{PersistenceMode, QueryStrategy, RagConfig};
use ragline_core::{
    EmbeddingProvider, Error, GenerationProvider, QuerySession, QueryVariant, RankedChunk,
    RequestContext, Result, RetrievedChunk, Stage,
};
use ragline_retrieval::{EmbeddingClient, QueryProcessor, Reranker, merge_candidates};
use ragline_store::{Backends, SessionStore, VectorStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{Instrument as _, debug, error, info, warn};
use uuid::Uuid;

/// One question to answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Natural-language question
    #[serde(default)]
    pub query: String,
    /// Number of chunks to answer from; defaults to `retrieval.default_k`
    #[serde(default)]
    pub max_chunks: Option<usize>,
    /// Owner of the resulting session
    #[serde(default)]
    pub user_id: Option<String>,
}

impl QueryRequest {
    /// Request for `query` with defaults.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

/// Outcome of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResponse {
    /// Answer text
    pub answer: String,
    /// Chunks the answer was built from, best first
    pub chunks: Vec<RankedChunk>,
    /// Session id, absent when the session could not be stored
    pub session_id: Option<String>,
    /// Wall time for the whole request
    pub processing_time_ms: u64,
    /// Whether the request ended in the fallback answer
    pub error_fallback: bool,
    /// Whether any search went through the degraded path
    pub degraded: bool,
    /// Correlation id carried by every log line of the request
    pub correlation_id: Uuid,
}

/// Retrieval-only result, for debugging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalReport {
    /// Variants that were searched
    pub variants: Vec<QueryVariant>,
    /// Reranked chunks, truncated to `top_k`
    pub chunks: Vec<RankedChunk>,
    /// Whether any search went through the degraded path
    pub degraded: bool,
}

/// Configured components, as reported by `GET /info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInfo {
    /// Embedding provider name
    pub embedding_provider: String,
    /// Embedding dimension
    pub embedding_dimension: usize,
    /// Generation provider name
    pub generation_provider: String,
    /// Vector backend name
    pub vector_backend: String,
    /// Session backend name
    pub session_backend: String,
    /// Query variant strategy
    pub query_strategy: String,
    /// Rerank strategy
    pub reranker: String,
    /// Default number of chunks
    pub default_k: usize,
    /// Largest accepted number of chunks
    pub max_k: usize,
    /// Primary-path similarity threshold
    pub similarity_threshold: f32,
    /// Global request timeout
    pub global_timeout_ms: u64,
    /// Persistence mode
    pub persistence: String,
}

struct StageOutput {
    answer: String,
    chunks: Vec<RankedChunk>,
    variants: usize,
}

/// The retrieval-augmented answer pipeline.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<RagConfig>,
    processor: QueryProcessor,
    embedder: EmbeddingClient,
    vectors: VectorStore,
    reranker: Reranker,
    generator: AnswerGenerator,
    sessions: SessionStore,
}

impl Pipeline {
    /// Assemble a pipeline from explicit providers and backends.
    ///
    /// # Errors
    /// Returns a config error if `config` fails validation or a vocabulary
    /// does not compile.
    pub fn new(
        config: RagConfig,
        embedding: Arc<dyn EmbeddingProvider>,
        generation: Arc<dyn GenerationProvider>,
        backends: Backends,
    ) -> Result<Self> {
        config.validate()?;
        let processor = QueryProcessor::new(&config.query)?;
        let reranker = Reranker::new(&config.rerank)?;
        let embedder = EmbeddingClient::new(embedding, &config.embedding);
        let generator = AnswerGenerator::new(generation, &config.generation);
        let vectors = VectorStore::new(backends.vectors, &config.retrieval, config.embedding.dimension);
        let sessions = SessionStore::new(
            backends.sessions,
            Duration::from_millis(config.store.request_timeout_ms),
        );

        Ok(Self {
            config: Arc::new(config),
            processor,
            embedder,
            vectors,
            reranker,
            generator,
            sessions,
        })
    }

    /// Build providers and backends named in `config`, then the pipeline.
    ///
    /// # Errors
    /// Returns an error if a provider or backend is missing credentials or
    /// `config` is invalid.
    pub fn from_config(config: RagConfig) -> Result<Self> {
        let embedding =
            ragline_providers::build_embedding_provider(&config.providers, config.embedding.dimension)?;
        let generation =
            ragline_providers::build_generation_provider(&config.providers, &config.generation)?;
        let backends = ragline_store::build_backends(&config.store)?;
        Self::new(config, embedding, generation, backends)
    }

    /// Active configuration
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Session persistence
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Chunk store
    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    /// Describe the configured components.
    pub fn info(&self) -> PipelineInfo {
        let config = &self.config;
        PipelineInfo {
            embedding_provider: self.embedder.provider_name().to_owned(),
            embedding_dimension: self.embedder.dimension(),
            generation_provider: self.generator.provider_name().to_owned(),
            vector_backend: self.vectors.backend_name().to_owned(),
            session_backend: self.sessions.backend_name().to_owned(),
            query_strategy: config.query.strategy.as_str().to_owned(),
            reranker: self.reranker.strategy().as_str().to_owned(),
            default_k: config.retrieval.default_k,
            max_k: config.retrieval.max_k,
            similarity_threshold: config.retrieval.similarity_threshold,
            global_timeout_ms: config.pipeline.global_timeout_ms,
            persistence: match config.pipeline.persistence {
                PersistenceMode::Await => "await",
                PersistenceMode::Background => "background",
            }
            .to_owned(),
        }
    }

    /// Requested chunk count, clamped to `max_k`.
    ///
    /// # Errors
    /// `Validation` when zero is requested.
    pub fn resolve_k(&self, max_chunks: Option<usize>) -> Result<usize> {
        let retrieval = &self.config.retrieval;
        match max_chunks {
            Some(0) => Err(Error::Validation(
                "max_chunks must be at least 1".to_owned(),
            )),
            Some(requested) => Ok(requested.min(retrieval.max_k)),
            None => Ok(retrieval.default_k),
        }
    }

    /// Answer one request.
    ///
    /// Only input validation fails; every downstream failure ends in the
    /// fallback answer with `error_fallback` set.
    ///
    /// # Errors
    /// `Validation` for a blank query or `max_chunks = 0`.
    pub async fn answer(&self, request: QueryRequest) -> Result<PipelineResponse> {
        if request.query.trim().is_empty() {
            return Err(Error::Validation("query is required".to_owned()));
        }
        let top_k = self.resolve_k(request.max_chunks)?;
        let context = RequestContext::new();
        let span = context.span();
        self.run(&context, request, top_k).instrument(span).await
    }

    async fn run(
        &self,
        context: &RequestContext,
        request: QueryRequest,
        top_k: usize,
    ) -> Result<PipelineResponse> {
        info!(top_k, user_id = ?request.user_id, "query received");
        let budget = Duration::from_millis(self.config.pipeline.global_timeout_ms);

        let (answer, chunks, variants) =
            match timeout(budget, self.stages(context, &request.query, top_k)).await {
                Ok(Ok(output)) => (output.answer, output.chunks, output.variants),
                Ok(Err(err)) => {
                    if context.stage().can_fail_over() {
                        warn!(
                            stage = %context.stage(),
                            error = %err,
                            retryable = err.is_retryable(),
                            "falling back"
                        );
                    } else {
                        error!(stage = %context.stage(), error = %err, "unexpected stage failure, falling back");
                    }
                    context.enter(Stage::ErrorFallback);
                    (fallback_answer(&request.query), Vec::new(), 0)
                }
                Err(_) => {
                    warn!(
                        stage = %context.stage(),
                        timeout_ms = self.config.pipeline.global_timeout_ms,
                        "global timeout expired, falling back"
                    );
                    context.enter(Stage::ErrorFallback);
                    (fallback_answer(&request.query), Vec::new(), 0)
                }
            };

        let error_fallback = context.stage() == Stage::ErrorFallback;
        context.enter(Stage::Persisting);
        let session = self.session(
            context,
            &request,
            &answer,
            &chunks,
            context.elapsed_ms(),
            error_fallback,
            variants,
        );
        let session_id = self.persist(session, context.remaining(budget)).await;
        context.enter(Stage::Done);
        let processing_time_ms = context.elapsed_ms();

        info!(
            chunks = chunks.len(),
            error_fallback,
            degraded = context.is_degraded(),
            processing_time_ms,
            stored = session_id.is_some(),
            "query answered"
        );
        Ok(PipelineResponse {
            answer,
            chunks,
            session_id,
            processing_time_ms,
            error_fallback,
            degraded: context.is_degraded(),
            correlation_id: context.correlation_id(),
        })
    }

    async fn stages(&self, context: &RequestContext, query: &str, top_k: usize) -> Result<StageOutput> {
        let variants = self.processor.expand(query, self.config.query.strategy);
        let candidates = self.retrieve_variants(context, &variants, top_k).await?;

        context.enter(Stage::Reranking);
        let mut chunks = self.reranker.rerank(query, candidates);
        chunks.truncate(top_k);

        context.enter(Stage::Generating);
        let answer = self.generator.generate(query, &chunks).await?;
        debug!(sources = answer.sources_used, "answer generated");

        Ok(StageOutput {
            answer: answer.text,
            chunks,
            variants: variants.len(),
        })
    }

    /// Embed and search every variant concurrently and merge the results.
    async fn retrieve_variants(
        &self,
        context: &RequestContext,
        variants: &[QueryVariant],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        context.enter(Stage::Embedding);
        let embedded = join_all(variants.iter().map(|variant| async move {
            (variant, self.embedder.embed(&variant.text).await)
        }))
        .await;

        let vectors: Vec<(&QueryVariant, Vec<f32>)> = embedded
            .into_iter()
            .filter_map(|(variant, result)| match result {
                Ok(vector) => Some((variant, vector)),
                Err(err) => {
                    warn!(variant = variant.tag.as_str(), error = %err, "dropping variant");
                    None
                }
            })
            .collect();
        if vectors.is_empty() {
            return Err(Error::EmbeddingUnavailable(
                "no query variant could be embedded".to_owned(),
            ));
        }

        context.enter(Stage::Retrieving);
        let threshold = self.config.retrieval.similarity_threshold;
        let searched = join_all(vectors.iter().map(|(variant, vector)| async move {
            (*variant, self.vectors.search(vector, top_k, threshold).await)
        }))
        .await;

        let mut result_sets = Vec::new();
        for (variant, result) in searched {
            match result {
                Ok(outcome) => {
                    if outcome.degraded {
                        context.mark_degraded();
                        warn!(variant = variant.tag.as_str(), "search served by fallback path");
                    }
                    result_sets.push(outcome.chunks);
                }
                Err(err) => {
                    warn!(variant = variant.tag.as_str(), error = %err, "dropping variant");
                }
            }
        }
        if result_sets.is_empty() {
            return Err(Error::StorageUnavailable(
                "no query variant could be searched".to_owned(),
            ));
        }

        let merged = merge_candidates(result_sets);
        debug!(
            variants = vectors.len(),
            candidates = merged.len(),
            "merged search results"
        );
        Ok(merged)
    }

    /// Retrieve and rerank without generating or persisting.
    ///
    /// # Errors
    /// `Validation` for a blank query or zero `top_k`; otherwise the error that
    /// stopped retrieval.
    pub async fn retrieve(&self, query: &str, max_chunks: Option<usize>) -> Result<RetrievalReport> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query is required".to_owned()));
        }
        let top_k = self.resolve_k(max_chunks)?;
        let context = RequestContext::new();
        let span = context.span();
        async {
            let variants = self.processor.expand(query, self.config.query.strategy);
            let candidates = self.retrieve_variants(&context, &variants, top_k).await?;
            context.enter(Stage::Reranking);
            let mut chunks = self.reranker.rerank(query, candidates);
            chunks.truncate(top_k);
            context.enter(Stage::Done);
            Ok(RetrievalReport {
                variants,
                chunks,
                degraded: context.is_degraded(),
            })
        }
        .instrument(span)
        .await
    }

    #[allow(
        clippy::too_many_arguments,
        reason = "Session fields come from several stages of one request"
    )]
    fn session(
        &self,
        context: &RequestContext,
        request: &QueryRequest,
        answer: &str,
        chunks: &[RankedChunk],
        processing_time_ms: u64,
        error_fallback: bool,
        variants: usize,
    ) -> QuerySession {
        let created_at = Utc::now();
        let mut metadata = Map::new();
        metadata.insert("num_chunks".to_owned(), json!(chunks.len()));
        metadata.insert("query_length".to_owned(), json!(request.query.chars().count()));
        metadata.insert("answer_length".to_owned(), json!(answer.chars().count()));
        metadata.insert("strategy".to_owned(), json!(self.strategy().as_str()));
        metadata.insert("reranker".to_owned(), json!(self.reranker.strategy().as_str()));
        metadata.insert("variants".to_owned(), json!(variants));
        metadata.insert("degraded".to_owned(), Value::Bool(context.is_degraded()));
        metadata.insert("error_fallback".to_owned(), Value::Bool(error_fallback));
        metadata.insert(
            "correlation_id".to_owned(),
            json!(context.correlation_id().to_string()),
        );
        metadata.insert("timestamp".to_owned(), json!(created_at.to_rfc3339()));

        QuerySession {
            id: SessionStore::new_session_id(),
            user_id: request.user_id.clone(),
            query_text: request.query.clone(),
            answer_text: answer.to_owned(),
            chunks: chunks
                .iter()
                .map(|ranked| RankedChunk {
                    chunk: ranked.chunk.without_embedding(),
                    ..ranked.clone()
                })
                .collect(),
            processing_time_ms,
            metadata,
            created_at,
        }
    }

    /// Store the session; returns its id when it was (or will be) stored.
    ///
    /// An awaited save never outlives `remaining`, the unused part of the
    /// global budget.
    async fn persist(&self, session: QuerySession, remaining: Duration) -> Option<String> {
        let bound = Duration::from_millis(self.config.pipeline.persistence_timeout_ms);
        match self.config.pipeline.persistence {
            PersistenceMode::Await => {
                let budget = bound.min(remaining);
                if budget.is_zero() {
                    warn!(session_id = %session.id, "global budget spent, session not saved");
                    return None;
                }
                match timeout(budget, self.sessions.save(&session)).await {
                    Ok(receipt) => receipt.storage_available.then_some(receipt.id),
                    Err(_) => {
                        warn!(
                            session_id = %session.id,
                            timeout_ms = budget.as_millis() as u64,
                            "session save timed out"
                        );
                        None
                    }
                }
            }
            PersistenceMode::Background => {
                let id = session.id.clone();
                let sessions = self.sessions.clone();
                tokio::spawn(
                    async move {
                        if timeout(bound, sessions.save(&session)).await.is_err() {
                            warn!(session_id = %session.id, "background session save timed out");
                        }
                    }
                    .in_current_span(),
                );
                Some(id)
            }
        }
    }

    fn strategy(&self) -> QueryStrategy {
        self.config.query.strategy
    }
}

/// Apology returned when the request cannot be answered.
pub fn fallback_answer(query: &str) -> String {
    format!(
        "I encountered an issue accessing the document database for your query \"{query}\". \
         This appears to be a temporary technical issue. Please try again later or contact \
         support if the problem persists."
    )
}
