//! Query variant generation under each strategy.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use ragline_core::VariantTag;
use ragline_core::config::{QueryConfig, QueryStrategy};
use ragline_retrieval::QueryProcessor;
use std::collections::HashSet;

fn processor() -> QueryProcessor {
    QueryProcessor::new(&QueryConfig::default()).expect("default vocabulary")
}

const COMPOUND: &str = "What are the main barriers to textile recycling in Europe and how do extended producer responsibility schemes address them?";

#[test]
fn basic_is_the_query_verbatim() {
    let variants = processor().expand("  What is circular economy? ", QueryStrategy::Basic);
    assert_eq!(variants.len(), 1);
    assert_eq!(variants[0].tag, VariantTag::Original);
    assert_eq!(variants[0].text, "  What is circular economy? ");
}

#[test]
fn enhanced_adds_one_rewrite() {
    let variants = processor().expand("What is circular economy?", QueryStrategy::Enhanced);
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[0].tag, VariantTag::Original);
    assert_eq!(variants[1].tag, VariantTag::Rewrite);
    assert_eq!(
        variants[1].text,
        "What is circular economy? economic impact"
    );
}

#[test]
fn enhanced_drops_rewrite_identical_to_original() {
    let variants = processor().expand("Plastic packaging rules", QueryStrategy::Enhanced);
    assert_eq!(variants.len(), 1);
}

#[test]
fn advanced_splits_compound_questions() {
    let variants = processor().expand(COMPOUND, QueryStrategy::Advanced);
    assert_eq!(variants[0].text, COMPOUND);
    let subs: Vec<&str> = variants
        .iter()
        .filter(|variant| variant.tag == VariantTag::SubQuestion)
        .map(|variant| variant.text.as_str())
        .collect();
    assert_eq!(
        subs,
        vec![
            "What are the main barriers to textile recycling in Europe",
            "how do extended producer responsibility schemes address them",
        ]
    );
}

#[test]
fn advanced_respects_sub_question_limit() {
    let config = QueryConfig {
        max_sub_questions: 1,
        ..QueryConfig::default()
    };
    let processor = QueryProcessor::new(&config).expect("processor");
    let variants = processor.expand(COMPOUND, QueryStrategy::Advanced);
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[1].tag, VariantTag::SubQuestion);
}

#[test]
fn advanced_falls_back_to_rewrite_for_simple_queries() {
    let variants = processor().expand("What is recycling?", QueryStrategy::Advanced);
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[1].tag, VariantTag::Rewrite);
    assert!(variants[1].text.contains("material recovery"));
}

#[test]
fn short_fragments_are_discarded() {
    let query = "Recycling and reuse or repair: which of these approaches matters most for electronics in cities?";
    let processor = processor();
    for fragment in processor.decompose(query) {
        assert!(fragment.chars().count() >= 10);
    }
}

#[test]
fn expansion_is_deterministic_and_duplicate_free() {
    let processor = processor();
    for strategy in [QueryStrategy::Basic, QueryStrategy::Enhanced, QueryStrategy::Advanced] {
        let first = processor.expand(COMPOUND, strategy);
        let second = processor.expand(COMPOUND, strategy);
        assert_eq!(first, second);
        let unique: HashSet<&str> = first.iter().map(|variant| variant.text.as_str()).collect();
        assert_eq!(unique.len(), first.len());
    }
}
