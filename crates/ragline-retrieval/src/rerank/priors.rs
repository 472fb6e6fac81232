//! Multiplicative metadata priors: document recency and document type.

use ragline_core::config::RerankConfig;
use ragline_core::{ChunkMetadata, Error, Result};
use regex::Regex;

/// Recency and document-type multipliers derived from chunk metadata.
#[derive(Debug, Clone)]
pub struct MetadataPriors {
    year_pattern: Regex,
    base_year: i32,
    step: f32,
    cap: f32,
    doc_type_weights: Vec<(String, f32)>,
}

impl MetadataPriors {
    /// Build priors from rerank settings.
    ///
    /// # Errors
    /// Returns a config error if the year pattern fails to compile.
    pub fn new(config: &RerankConfig) -> Result<Self> {
        let year_pattern = Regex::new(r"\b(20\d{2}|2[1-9])\b")
            .map_err(|err| Error::Config(format!("year pattern: {err}")))?;
        let doc_type_weights = config
            .doc_type_weights
            .iter()
            .map(|(keyword, weight)| (keyword.to_lowercase(), *weight))
            .collect();
        Ok(Self {
            year_pattern,
            base_year: config.recency_base_year,
            step: config.recency_step,
            cap: config.recency_cap,
            doc_type_weights,
        })
    }

    /// Combined multiplier for one chunk.
    pub fn weight(&self, metadata: &ChunkMetadata) -> f32 {
        self.recency(metadata) * self.doc_type(metadata)
    }

    /// Last year mentioned in the document name, if any. Two-digit years are
    /// read as 20xx.
    pub fn document_year(&self, metadata: &ChunkMetadata) -> Option<i32> {
        let last = self
            .year_pattern
            .find_iter(&metadata.document_name)
            .last()?;
        let year: i32 = last.as_str().parse().ok()?;
        Some(if year < 100 { 2000 + year } else { year })
    }

    /// `1 + min(step * (year - base), cap)`; documents at or before the base
    /// year, or without a year, get 1.0.
    pub fn recency(&self, metadata: &ChunkMetadata) -> f32 {
        self.document_year(metadata).map_or(1.0, |year| {
            let years_after = (year - self.base_year).max(0) as f32;
            1.0 + (years_after * self.step).min(self.cap)
        })
    }

    /// Largest weight among the document-type keywords found in the name.
    pub fn doc_type(&self, metadata: &ChunkMetadata) -> f32 {
        let name = metadata.document_name.to_lowercase();
        self.doc_type_weights
            .iter()
            .filter(|(keyword, _)| name.contains(keyword.as_str()))
            .map(|(_, weight)| *weight)
            .reduce(f32::max)
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priors() -> MetadataPriors {
        MetadataPriors::new(&RerankConfig::default()).expect("default priors")
    }

    fn named(name: &str) -> ChunkMetadata {
        ChunkMetadata::for_document(name)
    }

    #[test]
    fn recency_uses_last_year_in_name() {
        let priors = priors();
        assert_eq!(priors.document_year(&named("Outlook 2019 revised 2023")), Some(2023));
        assert_eq!(priors.document_year(&named("Gap Report 24")), Some(2024));
        assert_eq!(priors.document_year(&named("No year here")), None);
    }

    #[test]
    fn recency_bonus_is_capped() {
        let priors = priors();
        assert!((priors.recency(&named("Notes 2022")) - 1.1).abs() < 1e-6);
        assert!((priors.recency(&named("Notes 2030")) - 1.2).abs() < 1e-6);
        assert!((priors.recency(&named("Notes 2015")) - 1.0).abs() < 1e-6);
        assert!((priors.recency(&named("Notes")) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn doc_type_takes_strongest_keyword() {
        let priors = priors();
        assert!((priors.doc_type(&named("Annual Report")) - 1.2).abs() < 1e-6);
        assert!((priors.doc_type(&named("Summary and analysis")) - 1.15).abs() < 1e-6);
        assert!((priors.doc_type(&named("Field notes")) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn weight_multiplies_both_priors() {
        let priors = priors();
        let weight = priors.weight(&named("Circularity Gap Report 2022"));
        assert!((weight - 1.1 * 1.2).abs() < 1e-5);
    }
}
