//! Query type detection.

use serde::{Deserialize, Serialize};

/// Coarse question type, used to decide whether a short query gets the
/// domain prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// "what is", "how much", ...
    Factual,
    /// "compare", "versus", ...
    Comparison,
    /// "why", "explain", ...
    Conceptual,
    /// "trend", "over time", ...
    Temporal,
    /// None of the above
    General,
}

impl QueryType {
    /// Classify a query by whole-word keyword phrases, checked in the order
    /// factual, comparison, conceptual, temporal.
    pub fn detect(query: &str) -> Self {
        const FACTUAL_KEYWORDS: &[&str] = &["what is", "how much", "how many", "when did"];
        const COMPARISON_KEYWORDS: &[&str] =
            &["compare", "difference", "versus", "vs", "better", "worse"];
        const CONCEPTUAL_KEYWORDS: &[&str] = &[
            "why",
            "how does",
            "explain",
            "what causes",
            "what are the impacts",
        ];
        const TEMPORAL_KEYWORDS: &[&str] = &["trend", "over time", "change", "evolution", "progress"];

        let tokens = words(query);
        let mentions = |keywords: &[&str]| {
            keywords
                .iter()
                .any(|keyword| contains_phrase(&tokens, keyword))
        };

        if mentions(FACTUAL_KEYWORDS) {
            Self::Factual
        } else if mentions(COMPARISON_KEYWORDS) {
            Self::Comparison
        } else if mentions(CONCEPTUAL_KEYWORDS) {
            Self::Conceptual
        } else if mentions(TEMPORAL_KEYWORDS) {
            Self::Temporal
        } else {
            Self::General
        }
    }

    /// Type name as logged
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Comparison => "comparison",
            Self::Conceptual => "conceptual",
            Self::Temporal => "temporal",
            Self::General => "general",
        }
    }
}

/// Lowercased words, split on anything that is not alphanumeric.
fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Whether `phrase` occurs in `words` as a run of whole words.
fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    !needle.is_empty()
        && words
            .windows(needle.len())
            .any(|window| window.iter().zip(&needle).all(|(word, part)| word == part))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_each_type() {
        assert_eq!(QueryType::detect("What is circular economy?"), QueryType::Factual);
        assert_eq!(
            QueryType::detect("Compare recycling in France vs Germany"),
            QueryType::Comparison
        );
        assert_eq!(
            QueryType::detect("Explain the circularity gap"),
            QueryType::Conceptual
        );
        assert_eq!(
            QueryType::detect("Recycling trend since 2015"),
            QueryType::Temporal
        );
        assert_eq!(QueryType::detect("Plastic packaging rules"), QueryType::General);
    }

    #[test]
    fn factual_wins_over_later_types() {
        assert_eq!(
            QueryType::detect("What is the difference between reuse and recycling?"),
            QueryType::Factual
        );
    }

    #[test]
    fn keywords_match_whole_words_only() {
        assert_eq!(QueryType::detect("Canvas bags"), QueryType::General);
        assert_eq!(QueryType::detect("Exchange programmes"), QueryType::General);
    }
}
