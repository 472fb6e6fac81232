//! Embedding client: input validation, truncation, timeout and dimension
//! checks around an [`EmbeddingProvider`].

use ragline_core::config::EmbeddingConfig;
use ragline_core::{EmbeddingProvider, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Produces fixed-dimension vectors for query text.
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    max_input_chars: usize,
    timeout: Duration,
}

impl EmbeddingClient {
    /// Wrap `provider` with the limits in `config`.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            dimension: config.dimension,
            max_input_chars: config.max_input_chars,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Dimension every returned vector has
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Name of the wrapped provider
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Embed `text`.
    ///
    /// Input longer than the configured limit is truncated on a character
    /// boundary before the call.
    ///
    /// # Errors
    /// `Validation` for blank input; `EmbeddingUnavailable` on provider
    /// failure, timeout, or a vector of the wrong dimension.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::Validation("text to embed is empty".to_owned()));
        }
        let input = truncate_chars(text, self.max_input_chars);
        if input.len() < text.len() {
            debug!(
                original = text.len(),
                truncated = input.len(),
                "truncated embedding input"
            );
        }

        let vector = match timeout(self.timeout, self.provider.embed(input)).await {
            Ok(Ok(vector)) => vector,
            Ok(Err(Error::EmbeddingUnavailable(message))) => {
                return Err(Error::EmbeddingUnavailable(message));
            }
            Ok(Err(err)) => {
                return Err(Error::EmbeddingUnavailable(format!(
                    "{}: {err}",
                    self.provider.name()
                )));
            }
            Err(_) => {
                warn!(
                    provider = self.provider.name(),
                    timeout_ms = self.timeout.as_millis(),
                    "embedding timed out"
                );
                return Err(Error::EmbeddingUnavailable(format!(
                    "{} timed out after {}ms",
                    self.provider.name(),
                    self.timeout.as_millis()
                )));
            }
        };

        if vector.len() != self.dimension {
            return Err(Error::EmbeddingUnavailable(format!(
                "{} returned {} dimensions, expected {}",
                self.provider.name(),
                vector.len(),
                self.dimension
            )));
        }
        if vector.iter().any(|value| !value.is_finite()) {
            return Err(Error::EmbeddingUnavailable(format!(
                "{} returned non-finite values",
                self.provider.name()
            )));
        }
        Ok(vector)
    }
}

/// Longest prefix of `text` with at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(index, _)| &text[..index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("économie", 3), "éco");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exact", 5), "exact");
    }
}
