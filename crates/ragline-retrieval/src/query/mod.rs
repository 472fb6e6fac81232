//! Query analysis and variant generation.

mod analyzer;
mod processor;

pub use analyzer::QueryType;
pub use processor::QueryProcessor;
