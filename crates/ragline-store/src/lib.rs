//! Chunk and session storage.
//!
//! [`VectorStore`] and [`SessionStore`] hold the search and persistence rules;
//! the rows themselves live in a [`VectorBackend`] / [`SessionBackend`]
//! chosen from configuration: Supabase over PostgREST, or in-memory.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::missing_panics_doc,
        reason = "Test allows"
    )
)]

/// In-process backends.
pub mod memory;
/// Session persistence facade.
pub mod session;
/// Supabase/PostgREST backends.
pub mod supabase;
/// Vector search facade.
pub mod vector;

pub use memory::{MemorySessionBackend, MemoryVectorBackend};
pub use session::SessionStore;
pub use supabase::{PostgrestClient, SupabaseSessionBackend, SupabaseVectorBackend};
pub use vector::{VectorStore, cosine_similarity};

use ragline_core::config::{StoreConfig, StoreKind};
use ragline_core::{Result, SessionBackend, VectorBackend};
use std::sync::Arc;

/// Chunk and session backends built from the same store settings.
pub struct Backends {
    /// Chunk rows
    pub vectors: Arc<dyn VectorBackend>,
    /// Session rows
    pub sessions: Arc<dyn SessionBackend>,
}

/// Build both backends named by `config.kind`.
///
/// # Errors
/// Returns an error if Supabase is selected without a URL or key.
pub fn build_backends(config: &StoreConfig) -> Result<Backends> {
    let backends = match config.kind {
        StoreKind::Supabase => {
            let client = PostgrestClient::from_config(config)?;
            Backends {
                vectors: Arc::new(SupabaseVectorBackend::new(client.clone(), config)),
                sessions: Arc::new(SupabaseSessionBackend::new(client, config)),
            }
        }
        StoreKind::Memory => Backends {
            vectors: Arc::new(MemoryVectorBackend::new()),
            sessions: Arc::new(MemorySessionBackend::new()),
        },
    };
    tracing::info!(backend = backends.vectors.name(), "row store ready");
    Ok(backends)
}
