//! Query variant generation.

use super::analyzer::QueryType;
use ragline_core::config::{QueryConfig, QueryStrategy};
use ragline_core::{Error, QueryVariant, Result, VariantTag};
use regex::Regex;
use tracing::debug;

/// Fragments shorter than this are not useful sub-questions.
const MIN_FRAGMENT_CHARS: usize = 10;

/// Upper bound on sub-questions regardless of configuration.
const SUB_QUESTION_LIMIT: usize = 3;

/// Turns a user query into the variants that are embedded and searched.
#[derive(Debug, Clone)]
pub struct QueryProcessor {
    corrections: Vec<(Regex, String)>,
    expansions: Vec<(String, String)>,
    splitter: Regex,
    max_sub_questions: usize,
    decomposition_min_words: usize,
    short_query_words: usize,
    domain_prefix: String,
}

impl QueryProcessor {
    /// Compile the vocabularies in `config`.
    ///
    /// # Errors
    /// Returns a config error if a spell-correction entry does not compile
    /// into a word-boundary pattern.
    pub fn new(config: &QueryConfig) -> Result<Self> {
        let corrections = config
            .spell_corrections
            .iter()
            .map(|(variation, correct)| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(variation));
                Regex::new(&pattern)
                    .map(|compiled| (compiled, correct.clone()))
                    .map_err(|err| Error::Config(format!("spell correction '{variation}': {err}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let expansions = config
            .keyword_expansions
            .iter()
            .filter_map(|(term, phrases)| {
                phrases
                    .first()
                    .map(|phrase| (term.to_lowercase(), phrase.clone()))
            })
            .collect();

        let splitter = Regex::new(r"(?i)[?;]|\s+(?:and|or|also|additionally|furthermore)\s+")
            .map_err(|err| Error::Config(format!("compound splitter: {err}")))?;

        Ok(Self {
            corrections,
            expansions,
            splitter,
            max_sub_questions: config.max_sub_questions.min(SUB_QUESTION_LIMIT),
            decomposition_min_words: config.decomposition_min_words,
            short_query_words: config.short_query_words,
            domain_prefix: config.domain_prefix.trim().to_owned(),
        })
    }

    /// Variants for `query` under `strategy`. The original query is always
    /// first and no two variants share the same text.
    pub fn expand(&self, query: &str, strategy: QueryStrategy) -> Vec<QueryVariant> {
        let mut variants = vec![QueryVariant::new(VariantTag::Original, query)];

        match strategy {
            QueryStrategy::Basic => {}
            QueryStrategy::Enhanced => {
                push_unique(&mut variants, VariantTag::Rewrite, self.rewrite(query));
            }
            QueryStrategy::Advanced => {
                let sub_questions = self.decompose(query);
                if sub_questions.is_empty() {
                    push_unique(&mut variants, VariantTag::Rewrite, self.rewrite(query));
                } else {
                    for sub_question in sub_questions {
                        push_unique(&mut variants, VariantTag::SubQuestion, sub_question);
                    }
                }
            }
        }

        debug!(
            strategy = strategy.as_str(),
            variants = variants.len(),
            "expanded query"
        );
        variants
    }

    /// Trimmed, lowercased, whitespace-collapsed and spell-corrected text with
    /// the first letter capitalized.
    pub fn normalize(&self, query: &str) -> String {
        let mut text = query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        for (pattern, correct) in &self.corrections {
            if pattern.is_match(&text) {
                text = pattern.replace_all(&text, correct.as_str()).into_owned();
            }
        }
        capitalize(&text)
    }

    /// The enhanced rewrite: normalized text, plus the first expansion of
    /// every key term it mentions, plus the domain prefix when the result is a
    /// short factual question.
    pub fn rewrite(&self, query: &str) -> String {
        let normalized = self.normalize(query);
        let lowered = normalized.to_lowercase();
        let additions: Vec<&str> = self
            .expansions
            .iter()
            .filter(|(term, _)| lowered.contains(term.as_str()))
            .map(|(_, phrase)| phrase.as_str())
            .collect();

        let expanded = if additions.is_empty() {
            normalized
        } else {
            format!("{normalized} {}", additions.join(" "))
        };

        let is_short = expanded.split_whitespace().count() < self.short_query_words;
        if is_short
            && !self.domain_prefix.is_empty()
            && QueryType::detect(&expanded) == QueryType::Factual
        {
            format!("{} {expanded}", self.domain_prefix)
        } else {
            expanded
        }
    }

    /// Sub-questions of a compound query, at most the configured number.
    /// Empty when the query is too short or does not split into at least two
    /// usable fragments.
    pub fn decompose(&self, query: &str) -> Vec<String> {
        if self.max_sub_questions == 0
            || query.split_whitespace().count() < self.decomposition_min_words
        {
            return Vec::new();
        }

        let fragments: Vec<String> = self
            .splitter
            .split(query)
            .map(|fragment| fragment.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|fragment| fragment.chars().count() >= MIN_FRAGMENT_CHARS)
            .collect();

        if fragments.len() < 2 {
            return Vec::new();
        }
        fragments
            .into_iter()
            .take(self.max_sub_questions)
            .collect()
    }
}

fn push_unique(variants: &mut Vec<QueryVariant>, tag: VariantTag, text: String) {
    if !variants.iter().any(|variant| variant.text == text) {
        variants.push(QueryVariant::new(tag, text));
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> QueryProcessor {
        QueryProcessor::new(&QueryConfig::default()).expect("default vocabulary compiles")
    }

    #[test]
    fn normalize_collapses_and_corrects() {
        let processor = processor();
        assert_eq!(
            processor.normalize("  WHAT is   the circualrity   gap "),
            "What is the circularity gap"
        );
        // Whole words only: "waste" must not be touched by the "wast" entry.
        assert_eq!(processor.normalize("waste wast"), "Waste waste");
    }

    #[test]
    fn rewrite_appends_first_expansion_of_each_term() {
        let processor = processor();
        assert_eq!(
            processor.rewrite("Explain waste and recycling policy in the EU"),
            "Explain waste and recycling policy in the eu material recovery waste management"
        );
    }

    #[test]
    fn short_factual_queries_get_domain_prefix() {
        let processor = processor();
        assert_eq!(
            processor.rewrite("What is circularity?"),
            "sustainability circular economy What is circularity?"
        );
        // Expansion pushes the query over the short threshold first.
        assert_eq!(
            processor.rewrite("what is the economy"),
            "What is the economy economic impact"
        );
    }

    #[test]
    fn capitalize_handles_empty_and_unicode() {
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("économie"), "Économie");
    }
}
