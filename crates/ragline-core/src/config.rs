//! Configuration for providers, storage, retrieval and the answer pipeline.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Complete service configuration.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// HTTP listener settings
    pub server: ServerConfig,
    /// Embedding and generation providers
    pub providers: ProviderConfig,
    /// Embedding client limits
    pub embedding: EmbeddingConfig,
    /// Vector search settings
    pub retrieval: RetrievalConfig,
    /// Row store settings
    pub store: StoreConfig,
    /// Query variant generation
    pub query: QueryConfig,
    /// Candidate reranking
    pub rerank: RerankConfig,
    /// Answer generation
    pub generation: GenerationConfig,
    /// Request orchestration
    pub pipeline: PipelineConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

/// Which upstream model API to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Gemini (`embedContent` / `generateContent`)
    Gemini,
    /// Any OpenAI-compatible API (`/embeddings` / `/chat/completions`)
    #[serde(rename = "openai")]
    OpenAi,
    /// A local Ollama daemon
    Ollama,
    /// Deterministic offline provider for smoke runs
    Mock,
}

/// Embedding and generation provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider used for embeddings
    pub embedding: ProviderKind,
    /// Provider used for answer generation
    pub generation: ProviderKind,
    /// Gemini API key (falls back to `GEMINI_API_KEY`)
    pub gemini_api_key: Option<String>,
    /// Gemini API base URL
    pub gemini_base_url: String,
    /// OpenAI-compatible API key (falls back to `OPENAI_API_KEY`)
    pub openai_api_key: Option<String>,
    /// OpenAI-compatible API base URL
    pub openai_base_url: String,
    /// Ollama daemon URL
    pub ollama_url: String,
    /// Embedding model name; `None` uses the provider default
    pub embedding_model: Option<String>,
    /// Generation model name; `None` uses the provider default
    pub generation_model: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            embedding: ProviderKind::Gemini,
            generation: ProviderKind::Gemini,
            gemini_api_key: None,
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_owned(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_owned(),
            ollama_url: "http://localhost:11434".to_owned(),
            embedding_model: None,
            generation_model: None,
        }
    }
}

impl ProviderConfig {
    /// API key for a provider, checking config first, then environment variables.
    pub fn api_key(&self, kind: ProviderKind) -> Option<String> {
        match kind {
            ProviderKind::Gemini => self
                .gemini_api_key
                .clone()
                .or_else(|| env::var("GEMINI_API_KEY").ok()),
            ProviderKind::OpenAi => self
                .openai_api_key
                .clone()
                .or_else(|| env::var("OPENAI_API_KEY").ok()),
            ProviderKind::Ollama | ProviderKind::Mock => None,
        }
    }
}

/// Embedding client limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Fixed dimensionality of every stored and queried vector
    pub dimension: usize,
    /// Inputs longer than this are truncated on a char boundary
    pub max_input_chars: usize,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: 768,
            max_input_chars: 8000,
            timeout_ms: 10_000,
        }
    }
}

/// How the fallback search orders the rows it fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackRanking {
    /// Score fetched rows by cosine similarity before truncating
    Similarity,
    /// Keep rows in store order with similarity 0.0
    Unranked,
}

/// Vector search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks returned when the caller does not ask for a count
    pub default_k: usize,
    /// Upper bound on chunks per request
    pub max_k: usize,
    /// Minimum similarity on the primary search path
    pub similarity_threshold: f32,
    /// Per-search timeout in milliseconds
    pub search_timeout_ms: u64,
    /// Fallback fetches `k * fallback_overfetch` rows
    pub fallback_overfetch: usize,
    /// Ordering of fallback results
    pub fallback_ranking: FallbackRanking,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            max_k: 20,
            similarity_threshold: 0.5,
            search_timeout_ms: 5_000,
            fallback_overfetch: 4,
            fallback_ranking: FallbackRanking::Similarity,
        }
    }
}

/// Which row store to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Supabase over PostgREST
    Supabase,
    /// In-process store; contents are lost on restart
    Memory,
}

/// Row store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend kind
    pub kind: StoreKind,
    /// Project URL (falls back to `SUPABASE_URL`)
    pub supabase_url: Option<String>,
    /// Service role key (falls back to `SUPABASE_SERVICE_ROLE_KEY`)
    pub supabase_key: Option<String>,
    /// Table holding chunk rows
    pub vector_table: String,
    /// Table holding session rows
    pub session_table: String,
    /// Server-side similarity function
    pub match_function: String,
    /// Timeout for non-search row store calls, in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Supabase,
            supabase_url: None,
            supabase_key: None,
            vector_table: "document_embeddings".to_owned(),
            session_table: "query_sessions".to_owned(),
            match_function: "match_documents".to_owned(),
            request_timeout_ms: 10_000,
        }
    }
}

impl StoreConfig {
    /// Supabase URL from config or `SUPABASE_URL`.
    pub fn url(&self) -> Option<String> {
        self.supabase_url
            .clone()
            .or_else(|| env::var("SUPABASE_URL").ok())
    }

    /// Supabase key from config or `SUPABASE_SERVICE_ROLE_KEY`.
    pub fn key(&self) -> Option<String> {
        self.supabase_key
            .clone()
            .or_else(|| env::var("SUPABASE_SERVICE_ROLE_KEY").ok())
    }
}

/// Query variant strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStrategy {
    /// The query verbatim
    Basic,
    /// Original plus a normalized, expanded rewrite
    Enhanced,
    /// Original plus sub-questions of a compound query
    Advanced,
}

impl QueryStrategy {
    /// Strategy name as it appears in logs and session metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Enhanced => "enhanced",
            Self::Advanced => "advanced",
        }
    }
}

/// Query variant generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Strategy applied to every request
    pub strategy: QueryStrategy,
    /// Maximum sub-questions produced by the advanced strategy (at most 3)
    pub max_sub_questions: usize,
    /// Minimum word count before a query is considered for decomposition
    pub decomposition_min_words: usize,
    /// Queries shorter than this many words count as short
    pub short_query_words: usize,
    /// Prefix added to short factual queries
    pub domain_prefix: String,
    /// Misspelling to correction
    pub spell_corrections: BTreeMap<String, String>,
    /// Key term to expansion phrases; only the first phrase is used
    pub keyword_expansions: BTreeMap<String, Vec<String>>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        let spell_corrections = [
            ("circualrity", "circularity"),
            ("circularty", "circularity"),
            ("sustainabilty", "sustainability"),
            ("sustanability", "sustainability"),
            ("sustainibility", "sustainability"),
            ("econmy", "economy"),
            ("economie", "economy"),
            ("economi", "economy"),
            ("waist", "waste"),
            ("wast", "waste"),
            ("carbone", "carbon"),
            ("carbons", "carbon"),
            ("climat", "climate"),
            ("climte", "climate"),
            ("recyling", "recycling"),
            ("recycing", "recycling"),
            ("emmisions", "emissions"),
            ("emisions", "emissions"),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_owned(), to.to_owned()))
        .collect();

        let keyword_expansions = [
            ("circularity gap", &["circular economy gap", "circularity rate"][..]),
            ("waste", &["waste management", "waste reduction"][..]),
            ("recycling", &["material recovery", "resource recovery"][..]),
            ("emissions", &["carbon emissions", "greenhouse gas"][..]),
            (
                "sustainability",
                &["sustainable development", "environmental impact"][..],
            ),
            ("economy", &["economic impact", "economic model"][..]),
            ("resources", &["natural resources", "raw materials"][..]),
            ("climate", &["climate change", "global warming"][..]),
        ]
        .into_iter()
        .map(|(term, phrases)| {
            (
                term.to_owned(),
                phrases.iter().map(|phrase| (*phrase).to_owned()).collect(),
            )
        })
        .collect();

        Self {
            strategy: QueryStrategy::Enhanced,
            max_sub_questions: 3,
            decomposition_min_words: 12,
            short_query_words: 5,
            domain_prefix: "sustainability circular economy".to_owned(),
            spell_corrections,
            keyword_expansions,
        }
    }
}

/// Candidate reranking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankStrategy {
    /// Keep retrieval order
    None,
    /// Weighted blend of similarity and keyword score
    Hybrid,
}

impl RerankStrategy {
    /// Strategy name as it appears in logs and session metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Hybrid => "hybrid",
        }
    }
}

/// Candidate reranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// Strategy applied to every request
    pub strategy: RerankStrategy,
    /// Weight of the normalized similarity
    pub vector_weight: f32,
    /// Weight of the normalized keyword score
    pub lexical_weight: f32,
    /// Multiply by recency and document-type priors
    pub metadata_priors: bool,
    /// Years after this one earn the recency bonus
    pub recency_base_year: i32,
    /// Bonus per year after `recency_base_year`
    pub recency_step: f32,
    /// Cap on the recency bonus
    pub recency_cap: f32,
    /// Document name keyword to score multiplier
    pub doc_type_weights: BTreeMap<String, f32>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        let doc_type_weights = [("report", 1.2), ("analysis", 1.15), ("summary", 1.1)]
            .into_iter()
            .map(|(name, weight)| (name.to_owned(), weight))
            .collect();
        Self {
            strategy: RerankStrategy::Hybrid,
            vector_weight: 0.7,
            lexical_weight: 0.3,
            metadata_priors: true,
            recency_base_year: 2020,
            recency_step: 0.05,
            recency_cap: 0.2,
            doc_type_weights,
        }
    }
}

/// Answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Upper bound on packed context size, in characters
    pub max_context_chars: usize,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens in the answer
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 12_000,
            timeout_ms: 30_000,
            temperature: 0.2,
            max_output_tokens: 1024,
        }
    }
}

/// How the pipeline waits for session persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// Save before responding, bounded by `persistence_timeout_ms`
    Await,
    /// Respond immediately and save on a spawned task
    Background,
}

/// Request orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Budget for one whole request, in milliseconds
    pub global_timeout_ms: u64,
    /// Persistence mode
    pub persistence: PersistenceMode,
    /// Budget for an awaited save, in milliseconds
    pub persistence_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            global_timeout_ms: 60_000,
            persistence: PersistenceMode::Await,
            persistence_timeout_ms: 5_000,
        }
    }
}

impl RagConfig {
    /// Get the default config directory path (`~/.ragline`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".ragline"))
    }

    /// Get the default config file path (`~/.ragline/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, creating it with defaults on first run.
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("Failed to read config: {error}")))?;
        let config: Self = toml::from_str(&contents)?;

        tracing::debug!(
            path = %path.display(),
            embedding = ?config.providers.embedding,
            generation = ?config.providers.generation,
            store = ?config.store.kind,
            "loaded config"
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|error| Error::Config(format!("Failed to serialize config: {error}")))?;

        let header = "# ragline configuration file\n\
                      # This file is automatically generated on first run\n\
                      # Secrets may be left empty and supplied through the environment\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| Error::Config(format!("Failed to write config: {error}")))?;

        Ok(())
    }

    /// Apply `HOST` and `PORT` environment overrides.
    ///
    /// # Errors
    /// Returns an error if `PORT` is not a valid port number
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = env::var("HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|error| Error::Config(format!("Invalid PORT '{port}': {error}")))?;
        }
        Ok(())
    }

    /// Check weights, k bounds, dimension and timeouts.
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first violated constraint
    pub fn validate(&self) -> Result<()> {
        let retrieval = &self.retrieval;
        if retrieval.max_k == 0 {
            return Err(Error::Config("retrieval.max_k must be positive".to_owned()));
        }
        if retrieval.default_k == 0 || retrieval.default_k > retrieval.max_k {
            return Err(Error::Config(format!(
                "retrieval.default_k must be in 1..={}",
                retrieval.max_k
            )));
        }
        if !(-1.0..=1.0).contains(&retrieval.similarity_threshold) {
            return Err(Error::Config(
                "retrieval.similarity_threshold must be in [-1, 1]".to_owned(),
            ));
        }
        if retrieval.fallback_overfetch == 0 {
            return Err(Error::Config(
                "retrieval.fallback_overfetch must be positive".to_owned(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::Config("embedding.dimension must be positive".to_owned()));
        }
        if self.embedding.max_input_chars == 0 {
            return Err(Error::Config(
                "embedding.max_input_chars must be positive".to_owned(),
            ));
        }
        if self.query.max_sub_questions > 3 {
            return Err(Error::Config(
                "query.max_sub_questions must be at most 3".to_owned(),
            ));
        }

        let rerank = &self.rerank;
        if rerank.vector_weight < 0.0 || rerank.lexical_weight < 0.0 {
            return Err(Error::Config("rerank weights must be non-negative".to_owned()));
        }
        if rerank.vector_weight + rerank.lexical_weight <= 0.0 {
            return Err(Error::Config(
                "rerank weights must not both be zero".to_owned(),
            ));
        }
        if self.generation.max_context_chars == 0 {
            return Err(Error::Config(
                "generation.max_context_chars must be positive".to_owned(),
            ));
        }

        let global = self.pipeline.global_timeout_ms;
        let stage_timeouts = [
            ("embedding.timeout_ms", self.embedding.timeout_ms),
            ("retrieval.search_timeout_ms", retrieval.search_timeout_ms),
            ("generation.timeout_ms", self.generation.timeout_ms),
            (
                "pipeline.persistence_timeout_ms",
                self.pipeline.persistence_timeout_ms,
            ),
        ];
        for (name, timeout) in stage_timeouts {
            if timeout == 0 || timeout >= global {
                return Err(Error::Config(format!(
                    "{name} must be positive and below pipeline.global_timeout_ms ({global})"
                )));
            }
        }

        Ok(())
    }
}
