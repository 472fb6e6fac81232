//! Grounded answer generation: context packing and the generation call.

use ragline_core::config::GenerationConfig;
use ragline_core::{Error, GenerationProvider, GenerationRequest, RankedChunk, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Returned without calling the model when nothing was retrieved.
pub const NO_CONTEXT_ANSWER: &str =
    "I do not have enough information to answer your question. No relevant documents were found.";

const SYSTEM_INSTRUCTION: &str = "You are a research assistant answering questions about \
circular economy and sustainability publications. Answer only from the numbered sources you \
are given. If the sources do not contain the answer, say that the available documents do not \
cover it. Be concise and factual.";

const NO_OVERVIEW: &str = "No document summary available.";

const CITATION_INSTRUCTIONS: &str = "INSTRUCTIONS FOR CITATION:
- Use numbered citations [1], [2], etc. in your answer
- End your response with a \"Sources:\" section listing the numbered references
- Remember that page numbers are approximations (marked with ~)";

const SOURCE_SEPARATOR: &str = "\n\n";

/// Generated answer and how much context went into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Model output, or [`NO_CONTEXT_ANSWER`]
    pub text: String,
    /// Number of chunks packed into the prompt
    pub sources_used: usize,
}

/// Packed context for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedContext {
    /// Numbered sources joined by blank lines
    pub text: String,
    /// Number of chunks admitted
    pub sources_used: usize,
}

/// Builds the prompt from ranked chunks and calls the generation provider.
#[derive(Clone)]
pub struct AnswerGenerator {
    provider: Arc<dyn GenerationProvider>,
    max_context_chars: usize,
    timeout: Duration,
}

impl AnswerGenerator {
    /// Wrap `provider` with the limits in `config`.
    pub fn new(provider: Arc<dyn GenerationProvider>, config: &GenerationConfig) -> Self {
        Self {
            provider,
            max_context_chars: config.max_context_chars,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Name of the wrapped provider
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Answer `query` from `chunks`, best first.
    ///
    /// # Errors
    /// `GenerationUnavailable` if the provider fails, times out or returns
    /// blank text.
    pub async fn generate(&self, query: &str, chunks: &[RankedChunk]) -> Result<Answer> {
        if chunks.is_empty() {
            debug!("no chunks retrieved, skipping generation");
            return Ok(Answer {
                text: NO_CONTEXT_ANSWER.to_owned(),
                sources_used: 0,
            });
        }

        let context = self.pack_context(chunks);
        let request = GenerationRequest::new(
            SYSTEM_INSTRUCTION,
            build_prompt(query, &context.text, document_overview(chunks)),
        );
        debug!(
            sources = context.sources_used,
            context_chars = context.text.chars().count(),
            "calling generation provider"
        );

        let text = match timeout(self.timeout, self.provider.generate(&request)).await {
            Ok(Ok(text)) => text,
            Ok(Err(Error::GenerationUnavailable(message))) => {
                return Err(Error::GenerationUnavailable(message));
            }
            Ok(Err(err)) => {
                return Err(Error::GenerationUnavailable(format!(
                    "{}: {err}",
                    self.provider.name()
                )));
            }
            Err(_) => {
                warn!(
                    provider = self.provider.name(),
                    timeout_ms = self.timeout.as_millis(),
                    "generation timed out"
                );
                return Err(Error::GenerationUnavailable(format!(
                    "{} timed out after {}ms",
                    self.provider.name(),
                    self.timeout.as_millis()
                )));
            }
        };

        if text.trim().is_empty() {
            return Err(Error::GenerationUnavailable(format!(
                "{} returned an empty answer",
                self.provider.name()
            )));
        }
        Ok(Answer {
            text,
            sources_used: context.sources_used,
        })
    }

    /// Greedily pack numbered sources within the character budget.
    ///
    /// The first chunk is always admitted, its text truncated if the entry
    /// alone exceeds the budget. Packing stops at the first later chunk that
    /// does not fit.
    pub fn pack_context(&self, chunks: &[RankedChunk]) -> PackedContext {
        let mut text = String::new();
        let mut used_chars = 0;
        let mut sources_used = 0;

        for (idx, ranked) in chunks.iter().enumerate() {
            let number = idx + 1;
            let separator_chars = if idx == 0 { 0 } else { SOURCE_SEPARATOR.len() };
            let entry = source_entry(number, ranked, &ranked.chunk.text);
            let entry_chars = entry.chars().count();

            if used_chars + separator_chars + entry_chars <= self.max_context_chars {
                if idx > 0 {
                    text.push_str(SOURCE_SEPARATOR);
                }
                text.push_str(&entry);
                used_chars += separator_chars + entry_chars;
                sources_used += 1;
            } else if idx == 0 {
                let frame_chars = source_entry(number, ranked, "").chars().count();
                let room = self.max_context_chars.saturating_sub(frame_chars);
                let truncated: String = ranked.chunk.text.chars().take(room).collect();
                text.push_str(&source_entry(number, ranked, &truncated));
                sources_used += 1;
                break;
            } else {
                break;
            }
        }

        PackedContext { text, sources_used }
    }
}

fn source_entry(number: usize, ranked: &RankedChunk, body: &str) -> String {
    let metadata = &ranked.chunk.metadata;
    format!(
        "Source [{number}]: {} (Page {})\nContent:\n\"\"\"\n{body}\n\"\"\"",
        metadata.display_name(),
        metadata.page_label()
    )
}

fn document_overview(chunks: &[RankedChunk]) -> &str {
    chunks
        .first()
        .and_then(|top| top.chunk.metadata.summary_of_document.as_deref())
        .filter(|summary| !summary.trim().is_empty())
        .unwrap_or(NO_OVERVIEW)
}

fn build_prompt(query: &str, context: &str, overview: &str) -> String {
    format!(
        "DOCUMENT OVERVIEW: {overview}\n\nAVAILABLE INFORMATION:\n{context}\n\n\
         {CITATION_INSTRUCTIONS}\n\nUSER QUESTION: {query}\n\nANSWER:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::{Chunk, ChunkMetadata};
    use ragline_providers::MockProvider;

    fn ranked(id: &str, text: &str, metadata: ChunkMetadata) -> RankedChunk {
        RankedChunk {
            chunk: Chunk::new(id, text, Vec::new(), metadata),
            combined_score: 1.0,
            similarity: 0.9,
            lexical_score: 0.0,
            retrieval_rank: 0,
        }
    }

    fn generator(max_context_chars: usize) -> AnswerGenerator {
        let config = GenerationConfig {
            max_context_chars,
            ..GenerationConfig::default()
        };
        AnswerGenerator::new(Arc::new(MockProvider::new(4)), &config)
    }

    #[test]
    fn sources_are_numbered_with_page_labels() {
        let chunks = vec![
            ranked(
                "a",
                "First text.",
                ChunkMetadata::for_document("Gap Report").with_page(4, true),
            ),
            ranked(
                "b",
                "Second text.",
                ChunkMetadata::for_document("Outlook").with_page(9, false),
            ),
        ];
        let packed = generator(10_000).pack_context(&chunks);
        assert_eq!(packed.sources_used, 2);
        assert!(packed.text.starts_with("Source [1]: Gap Report (Page ~4)\nContent:"));
        assert!(packed.text.contains("Source [2]: Outlook (Page 9)"));
    }

    #[test]
    fn packing_stops_at_first_chunk_that_does_not_fit() {
        let chunks = vec![
            ranked("a", &"a".repeat(40), ChunkMetadata::for_document("A")),
            ranked("b", &"b".repeat(400), ChunkMetadata::for_document("B")),
            ranked("c", "tiny", ChunkMetadata::for_document("C")),
        ];
        let packed = generator(200).pack_context(&chunks);
        assert_eq!(packed.sources_used, 1);
        assert!(!packed.text.contains("tiny"));
        assert!(packed.text.chars().count() <= 200);
    }

    #[test]
    fn oversized_first_chunk_is_truncated() {
        let chunks = vec![ranked("a", &"x".repeat(5_000), ChunkMetadata::for_document("Big"))];
        let packed = generator(300).pack_context(&chunks);
        assert_eq!(packed.sources_used, 1);
        assert_eq!(packed.text.chars().count(), 300);
    }

    #[test]
    fn overview_comes_from_top_chunk() {
        let mut metadata = ChunkMetadata::for_document("Report");
        metadata.summary_of_document = Some("A yearly survey.".to_owned());
        let chunks = vec![
            ranked("a", "text", metadata),
            ranked("b", "text", ChunkMetadata::default()),
        ];
        assert_eq!(document_overview(&chunks), "A yearly survey.");
        assert_eq!(document_overview(&chunks[1..]), NO_OVERVIEW);
    }

    #[test]
    fn prompt_carries_question_and_citation_rules() {
        let prompt = build_prompt("What is circularity?", "Source [1]: ...", NO_OVERVIEW);
        assert!(prompt.contains("USER QUESTION: What is circularity?"));
        assert!(prompt.contains("INSTRUCTIONS FOR CITATION:"));
        assert!(prompt.ends_with("ANSWER:"));
    }
}
