use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name shown for chunks whose metadata carries no document name.
pub const UNKNOWN_DOCUMENT: &str = "Unknown Document";

/// Maximum number of characters kept in a session preview.
const PREVIEW_CHARS: usize = 100;

/// Descriptive metadata stored alongside every chunk.
///
/// Field names on the wire follow the row format already present in the
/// `document_embeddings` table; the Rust-side names are used as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Name of the source document
    #[serde(default)]
    pub document_name: String,
    /// Page the chunk was taken from, if known
    #[serde(default, rename = "page_in_document", alias = "page_number")]
    pub page_number: Option<u32>,
    /// Whether `page_number` is an estimate
    #[serde(
        default = "default_true",
        rename = "page_approximation",
        alias = "page_is_approximate"
    )]
    pub page_is_approximate: bool,
    /// Short summary of the chunk itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_of_chunk: Option<String>,
    /// Short summary of the whole source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_of_document: Option<String>,
    /// Any other metadata keys, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const fn default_true() -> bool {
    true
}

impl Default for ChunkMetadata {
    fn default() -> Self {
        Self {
            document_name: String::new(),
            page_number: None,
            page_is_approximate: true,
            summary_of_chunk: None,
            summary_of_document: None,
            extra: Map::new(),
        }
    }
}

impl ChunkMetadata {
    /// Create metadata for a named document.
    pub fn for_document(document_name: impl Into<String>) -> Self {
        Self {
            document_name: document_name.into(),
            ..Self::default()
        }
    }

    /// Set the page number.
    #[must_use]
    pub fn with_page(mut self, page: u32, approximate: bool) -> Self {
        self.page_number = Some(page);
        self.page_is_approximate = approximate;
        self
    }

    /// Document name, or [`UNKNOWN_DOCUMENT`] when missing.
    pub fn display_name(&self) -> &str {
        if self.document_name.trim().is_empty() {
            UNKNOWN_DOCUMENT
        } else {
            &self.document_name
        }
    }

    /// Human-readable page label: `~12` for approximate pages, `12` for exact
    /// ones, `unknown` when no page is recorded.
    pub fn page_label(&self) -> String {
        match self.page_number {
            Some(page) if self.page_is_approximate => format!("~{page}"),
            Some(page) => page.to_string(),
            None => "unknown".to_owned(),
        }
    }
}

/// Atomic retrievable unit of document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier, unique within the store
    pub id: String,
    /// Chunk text
    #[serde(alias = "content")]
    pub text: String,
    /// Dense vector; empty when the chunk was loaded without its embedding
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Descriptive metadata
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        embedding: Vec<f32>,
        metadata: ChunkMetadata,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding,
            metadata,
        }
    }

    /// Copy of this chunk with the embedding stripped, as persisted in sessions.
    #[must_use]
    pub fn without_embedding(&self) -> Self {
        Self {
            id: self.id.clone(),
            text: self.text.clone(),
            embedding: Vec::new(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Which strategy produced a query variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantTag {
    /// The query as submitted
    Original,
    /// A normalized and expanded rewrite
    Rewrite,
    /// One fragment of a decomposed compound question
    SubQuestion,
}

impl VariantTag {
    /// Tag as it appears in logs and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Rewrite => "rewrite",
            Self::SubQuestion => "sub_question",
        }
    }
}

/// One search text derived from the user's query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryVariant {
    /// Strategy that produced the variant
    pub tag: VariantTag,
    /// Text to embed and search with
    pub text: String,
}

impl QueryVariant {
    /// Create a new variant.
    pub fn new(tag: VariantTag, text: impl Into<String>) -> Self {
        Self {
            tag,
            text: text.into(),
        }
    }
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// The chunk
    pub chunk: Chunk,
    /// Cosine similarity to the query embedding
    pub similarity: f32,
    /// 0-based position in retrieval order
    pub rank: usize,
}

/// Result of a vector search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Retrieved chunks, best first
    pub chunks: Vec<RetrievedChunk>,
    /// Whether the fallback path produced this result
    pub degraded: bool,
}

/// A chunk after reranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChunk {
    /// The chunk
    pub chunk: Chunk,
    /// Score that determines output order
    pub combined_score: f32,
    /// Cosine similarity carried over from retrieval
    pub similarity: f32,
    /// Normalized keyword score, 0.0 when lexical scoring was not used
    pub lexical_score: f32,
    /// Position the chunk had before reranking
    pub retrieval_rank: usize,
}

/// Persisted record of one query/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySession {
    /// Session identifier
    pub id: String,
    /// Caller-supplied user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// The query as submitted
    #[serde(rename = "query")]
    pub query_text: String,
    /// The generated answer
    #[serde(rename = "answer")]
    pub answer_text: String,
    /// Chunks used as context, without embeddings
    #[serde(default)]
    pub chunks: Vec<RankedChunk>,
    /// Wall-clock time spent answering
    pub processing_time_ms: u64,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Compact listing entry for a stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier
    pub id: String,
    /// First characters of the query
    pub preview: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Number of chunks used as context
    pub chunk_count: usize,
    /// Wall-clock time spent answering
    pub processing_time_ms: u64,
}

impl From<&QuerySession> for SessionSummary {
    fn from(session: &QuerySession) -> Self {
        let mut preview: String = session.query_text.chars().take(PREVIEW_CHARS).collect();
        if session.query_text.chars().count() > PREVIEW_CHARS {
            preview.push_str("...");
        }
        Self {
            id: session.id.clone(),
            preview,
            created_at: session.created_at,
            chunk_count: session.chunks.len(),
            processing_time_ms: session.processing_time_ms,
        }
    }
}

/// Outcome of a session save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReceipt {
    /// Session identifier, generated locally when storage was unreachable
    pub id: String,
    /// Whether the session actually reached storage
    pub storage_available: bool,
}

/// Aggregate figures over all stored sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Number of stored sessions
    pub total_sessions: u64,
    /// Mean processing time over all sessions
    pub avg_processing_time_ms: f64,
    /// Oldest session timestamp
    pub first_query_time: Option<DateTime<Utc>>,
    /// Newest session timestamp
    pub last_query_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_value, json, to_value};

    #[test]
    fn metadata_reads_stored_row_format() {
        let metadata: ChunkMetadata = from_value(json!({
            "document_name": "EU Circularity Report 2023",
            "page_in_document": 14,
            "page_approximation": false,
            "summary_of_document": "Overview of EU policy",
            "source_url": "https://example.org/report.pdf"
        }))
        .expect("metadata parses");

        assert_eq!(metadata.page_number, Some(14));
        assert!(!metadata.page_is_approximate);
        assert_eq!(
            metadata.summary_of_document.as_deref(),
            Some("Overview of EU policy")
        );
        assert_eq!(
            metadata.extra.get("source_url"),
            Some(&json!("https://example.org/report.pdf"))
        );
    }

    #[test]
    fn metadata_defaults_when_fields_missing() {
        let metadata: ChunkMetadata = from_value(json!({})).expect("metadata parses");
        assert_eq!(metadata.display_name(), UNKNOWN_DOCUMENT);
        assert!(metadata.page_is_approximate);
        assert_eq!(metadata.page_label(), "unknown");
    }

    #[test]
    fn page_label_marks_approximation() {
        let approximate = ChunkMetadata::for_document("a").with_page(3, true);
        let exact = ChunkMetadata::for_document("a").with_page(3, false);
        assert_eq!(approximate.page_label(), "~3");
        assert_eq!(exact.page_label(), "3");
    }

    #[test]
    fn session_chunks_drop_embeddings() {
        let chunk = Chunk::new("c1", "text", vec![0.1, 0.2], ChunkMetadata::default());
        let stripped = chunk.without_embedding();
        let value = to_value(&stripped).expect("chunk serializes");
        assert!(value.get("embedding").is_none());
        assert_eq!(stripped.text, "text");
    }

    #[test]
    fn summary_truncates_long_queries() {
        let session = QuerySession {
            id: "s1".to_owned(),
            user_id: None,
            query_text: "q".repeat(150),
            answer_text: "a".to_owned(),
            chunks: Vec::new(),
            processing_time_ms: 12,
            metadata: Map::new(),
            created_at: Utc::now(),
        };
        let summary = SessionSummary::from(&session);
        assert_eq!(summary.preview.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(summary.chunk_count, 0);
    }

    #[test]
    fn variant_tags_serialize_snake_case() {
        let value = to_value(VariantTag::SubQuestion).expect("tag serializes");
        assert_eq!(value, json!("sub_question"));
        assert_eq!(VariantTag::Rewrite.as_str(), "rewrite");
    }
}
