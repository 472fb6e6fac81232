//! Config file loading and saving.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use ragline_core::config::{PersistenceMode, ProviderKind, StoreKind};
use ragline_core::{Error, RagConfig};
use std::fs;
use std::io::Write as _;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn loads_sections_from_toml_file() {
    let mut file = NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"
[providers]
embedding = "openai"
generation = "ollama"
openai_api_key = "test_openai_key_123"

[store]
kind = "memory"

[pipeline]
persistence = "background"
global_timeout_ms = 45000
"#
    )
    .expect("write config");

    let config = RagConfig::load_from_file(file.path()).expect("config loads");
    assert_eq!(config.providers.embedding, ProviderKind::OpenAi);
    assert_eq!(config.providers.generation, ProviderKind::Ollama);
    assert_eq!(
        config.providers.api_key(ProviderKind::OpenAi).as_deref(),
        Some("test_openai_key_123")
    );
    assert_eq!(config.store.kind, StoreKind::Memory);
    assert_eq!(config.pipeline.persistence, PersistenceMode::Background);
    assert_eq!(config.pipeline.global_timeout_ms, 45_000);
    assert!(config.validate().is_ok());
}

#[test]
fn saved_config_round_trips_with_header() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("nested").join("config.toml");

    let mut config = RagConfig::default();
    config.retrieval.default_k = 7;
    config.query.domain_prefix = "battery recycling".to_owned();
    config.save_to_file(&path).expect("config saves");

    let contents = fs::read_to_string(&path).expect("read back");
    assert!(contents.starts_with("# ragline configuration file"));

    let loaded = RagConfig::load_from_file(&path).expect("config reloads");
    assert_eq!(loaded.retrieval.default_k, 7);
    assert_eq!(loaded.query.domain_prefix, "battery recycling");
    assert_eq!(loaded.rerank.doc_type_weights.len(), 3);
}

#[test]
fn malformed_toml_is_reported() {
    let mut file = NamedTempFile::new().expect("temp file");
    write!(file, "[retrieval\ndefault_k = ").expect("write config");

    let result = RagConfig::load_from_file(file.path());
    assert!(matches!(result, Err(Error::Toml(_))));
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = TempDir::new().expect("temp dir");
    let result = RagConfig::load_from_file(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(Error::Config(_))));
}
