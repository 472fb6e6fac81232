//! In-process backends for local runs and tests.

use async_trait::async_trait;
use ragline_core::{
    Chunk, Error, IgnoreLock as _, QuerySession, Result, RetrievedChunk, SessionBackend,
    SessionStats, VectorBackend,
};
use std::cmp::Ordering;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Duration;
use tokio::time::sleep;

use crate::session::summarize;
use crate::vector::cosine_similarity;

/// Chunk rows kept in insertion order.
#[derive(Default)]
pub struct MemoryVectorBackend {
    rows: Mutex<Vec<Chunk>>,
    match_unavailable: AtomicBool,
    rows_unavailable: AtomicBool,
}

impl MemoryVectorBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend holding `chunks`.
    pub fn with_chunks(chunks: impl IntoIterator<Item = Chunk>) -> Self {
        Self {
            rows: Mutex::new(chunks.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Make the ranked similarity function fail, as when it is not installed.
    pub fn set_match_unavailable(&self, unavailable: bool) {
        self.match_unavailable.store(unavailable, AtomicOrdering::Release);
    }

    /// Make plain row reads fail.
    pub fn set_rows_unavailable(&self, unavailable: bool) {
        self.rows_unavailable.store(unavailable, AtomicOrdering::Release);
    }

    fn check_rows(&self) -> Result<()> {
        if self.rows_unavailable.load(AtomicOrdering::Acquire) {
            Err(Error::StorageUnavailable("memory rows unavailable".to_owned()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VectorBackend for MemoryVectorBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, chunk: &Chunk) -> Result<()> {
        self.check_rows()?;
        let mut rows = self.rows.lock_ignore_poison();
        if let Some(existing) = rows.iter_mut().find(|row| row.id == chunk.id) {
            *existing = chunk.clone();
        } else {
            rows.push(chunk.clone());
        }
        drop(rows);
        Ok(())
    }

    async fn match_chunks(
        &self,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedChunk>> {
        if self.match_unavailable.load(AtomicOrdering::Acquire) {
            return Err(Error::StorageUnavailable(
                "function match_documents does not exist".to_owned(),
            ));
        }
        self.check_rows()?;

        let mut scored: Vec<RetrievedChunk> = self
            .rows
            .lock_ignore_poison()
            .iter()
            .filter_map(|chunk| {
                let similarity = cosine_similarity(embedding, &chunk.embedding);
                (similarity >= threshold).then(|| RetrievedChunk {
                    chunk: chunk.clone(),
                    similarity,
                    rank: 0,
                })
            })
            .collect();

        scored.sort_by(|first, second| {
            second
                .similarity
                .partial_cmp(&first.similarity)
                .unwrap_or(Ordering::Equal)
        });
        scored.truncate(limit);
        for (rank, row) in scored.iter_mut().enumerate() {
            row.rank = rank;
        }
        Ok(scored)
    }

    async fn fetch_rows(&self, limit: usize) -> Result<Vec<Chunk>> {
        self.check_rows()?;
        Ok(self
            .rows
            .lock_ignore_poison()
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>> {
        self.check_rows()?;
        Ok(self
            .rows
            .lock_ignore_poison()
            .iter()
            .find(|row| row.id == id)
            .cloned())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        self.check_rows()?;
        let mut rows = self.rows.lock_ignore_poison();
        let before = rows.len();
        rows.retain(|row| !ids.contains(&row.id));
        let removed = before - rows.len();
        drop(rows);
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        self.check_rows()?;
        Ok(self.rows.lock_ignore_poison().len())
    }
}

/// Session rows kept in insertion order.
#[derive(Default)]
pub struct MemorySessionBackend {
    sessions: Mutex<Vec<QuerySession>>,
    unavailable: AtomicBool,
    insert_delay: Mutex<Option<Duration>>,
}

impl MemorySessionBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail, as when the row store is down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::Release);
    }

    /// Stall every insert for `delay`, as when the row store is slow.
    pub fn set_insert_delay(&self, delay: Option<Duration>) {
        *self.insert_delay.lock_ignore_poison() = delay;
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(AtomicOrdering::Acquire) {
            Err(Error::StorageUnavailable("memory sessions unavailable".to_owned()))
        } else {
            Ok(())
        }
    }

    fn newest_first(
        &self,
        user_id: Option<&str>,
        limit: usize,
        keep: impl Fn(&QuerySession) -> bool,
    ) -> Vec<QuerySession> {
        let mut matching: Vec<QuerySession> = self
            .sessions
            .lock_ignore_poison()
            .iter()
            .filter(|session| user_id.is_none_or(|user| session.user_id.as_deref() == Some(user)))
            .filter(|session| keep(session))
            .cloned()
            .collect();
        matching.sort_by(|first, second| second.created_at.cmp(&first.created_at));
        matching.truncate(limit);
        matching
    }
}

#[async_trait]
impl SessionBackend for MemorySessionBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, session: &QuerySession) -> Result<()> {
        let delay = *self.insert_delay.lock_ignore_poison();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        self.check()?;
        let mut sessions = self.sessions.lock_ignore_poison();
        if sessions.iter().any(|existing| existing.id == session.id) {
            return Err(Error::StorageUnavailable(format!(
                "duplicate session id {}",
                session.id
            )));
        }
        sessions.push(session.clone());
        drop(sessions);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<QuerySession>> {
        self.check()?;
        Ok(self
            .sessions
            .lock_ignore_poison()
            .iter()
            .find(|session| session.id == id)
            .cloned())
    }

    async fn list_recent(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QuerySession>> {
        self.check()?;
        Ok(self.newest_first(user_id, limit, |_| true))
    }

    async fn search(
        &self,
        user_id: Option<&str>,
        text: &str,
        limit: usize,
    ) -> Result<Vec<QuerySession>> {
        self.check()?;
        let needle = text.to_lowercase();
        Ok(self.newest_first(user_id, limit, |session| {
            session.query_text.to_lowercase().contains(&needle)
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.check()?;
        let mut sessions = self.sessions.lock_ignore_poison();
        let before = sessions.len();
        sessions.retain(|session| session.id != id);
        let removed = sessions.len() < before;
        drop(sessions);
        Ok(removed)
    }

    async fn stats(&self) -> Result<SessionStats> {
        self.check()?;
        let rows: Vec<_> = self
            .sessions
            .lock_ignore_poison()
            .iter()
            .map(|session| (session.processing_time_ms, session.created_at))
            .collect();
        Ok(summarize(rows))
    }
}
