//! BM25 keyword scoring over a candidate set.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// BM25 parameters
const K1: f32 = 1.5; // Term frequency saturation parameter
const B: f32 = 0.75; // Length normalization parameter

/// Term statistics for one candidate text
#[derive(Debug, Clone)]
struct Document {
    terms: HashMap<String, usize>, // term -> frequency
    length: usize,
}

/// BM25 index over a small, fixed set of texts.
///
/// Built per request from the retrieved candidates, so IDF reflects how
/// discriminating a term is among the chunks that are actually competing.
#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    documents: Vec<Document>,
    avg_doc_length: f32,
    idf: HashMap<String, f32>,
}

impl LexicalIndex {
    /// Common stop words that should not influence scoring
    fn stopwords() -> &'static HashSet<&'static str> {
        static STOPWORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
        STOPWORDS.get_or_init(|| {
            [
                "the", "and", "for", "with", "that", "from", "this", "have", "will", "into",
                "when", "where", "what", "your", "their", "about", "which", "there", "been",
                "while", "should", "could", "would", "they", "them", "then", "than", "only",
                "also", "over", "under", "after", "before", "each", "more", "most", "some",
                "such", "within", "between", "because", "being", "through", "however", "its",
                "are", "was", "were", "how", "why", "does", "can", "our", "you",
            ]
            .into_iter()
            .collect()
        })
    }

    /// Index `texts` in order; scores come back in the same order.
    pub fn build<'text>(texts: impl IntoIterator<Item = &'text str>) -> Self {
        let documents: Vec<Document> = texts
            .into_iter()
            .map(|text| {
                let terms = Self::tokenize(text);
                let length = terms.len();
                let mut frequencies = HashMap::new();
                for term in terms {
                    *frequencies.entry(term).or_insert(0) += 1;
                }
                Document {
                    terms: frequencies,
                    length,
                }
            })
            .collect();

        if documents.is_empty() {
            return Self::default();
        }

        let total_length: usize = documents.iter().map(|doc| doc.length).sum();
        let avg_doc_length = (total_length as f32 / documents.len() as f32).max(1.0);

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for doc in &documents {
            for term in doc.terms.keys() {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let num_docs = documents.len() as f32;
        let idf = doc_freq
            .into_iter()
            .map(|(term, df)| {
                let weight = ((num_docs - df as f32 + 0.5) / (df as f32 + 0.5)).ln_1p();
                (term.to_owned(), weight)
            })
            .collect();

        Self {
            documents,
            avg_doc_length,
            idf,
        }
    }

    /// Number of indexed texts
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether nothing was indexed
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Raw BM25 score of every indexed text against `query`, in index order.
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let query_terms = Self::tokenize(query);
        self.documents
            .iter()
            .map(|doc| self.score_document(doc, &query_terms))
            .collect()
    }

    fn score_document(&self, doc: &Document, query_terms: &[String]) -> f32 {
        let doc_len_norm = doc.length as f32 / self.avg_doc_length;
        query_terms
            .iter()
            .filter_map(|term| {
                let tf = *doc.terms.get(term)? as f32;
                let idf = self.idf.get(term).copied().unwrap_or(0.0);
                let numerator = tf * (K1 + 1.0);
                let denominator = K1.mul_add(B.mul_add(doc_len_norm, 1.0 - B), tf);
                Some(idf * (numerator / denominator))
            })
            .sum()
    }

    /// Lowercased alphanumeric words longer than two characters, plus bigrams.
    fn tokenize(text: &str) -> Vec<String> {
        let stopwords = Self::stopwords();
        let words: Vec<String> = text
            .split_whitespace()
            .map(|word| {
                word.to_lowercase()
                    .chars()
                    .filter(|ch| ch.is_alphanumeric() || *ch == '_')
                    .collect::<String>()
            })
            .collect();
        let keep = |word: &str| word.chars().count() > 2 && !stopwords.contains(word);

        let mut terms: Vec<String> = words.iter().filter(|word| keep(word)).cloned().collect();
        for window in words.windows(2) {
            let (first, second) = (&window[0], &window[1]);
            if keep(first) && keep(second) {
                terms.push(format!("{first}_{second}"));
            }
        }
        terms
    }
}
