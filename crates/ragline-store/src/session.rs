//! Best-effort persistence of query sessions.

use chrono::{DateTime, Utc};
use ragline_core::{
    Error, QuerySession, Result, SaveReceipt, SessionBackend, SessionStats, SessionSummary,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// Session persistence over a pluggable row store.
///
/// `save` never fails: if the backend is unreachable the caller still gets
/// the session id, flagged as not stored.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    request_timeout: Duration,
}

impl SessionStore {
    /// Create a store over `backend`; every backend call is bounded by `request_timeout`.
    pub fn new(backend: Arc<dyn SessionBackend>, request_timeout: Duration) -> Self {
        Self {
            backend,
            request_timeout,
        }
    }

    /// Fresh session identifier.
    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Backend name for logging.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        timeout(self.request_timeout, call).await.map_err(|_| {
            Error::StorageUnavailable(format!(
                "session {operation} timed out after {:?}",
                self.request_timeout
            ))
        })?
    }

    /// Persist a session.
    pub async fn save(&self, session: &QuerySession) -> SaveReceipt {
        match self.bounded("save", self.backend.insert(session)).await {
            Ok(()) => {
                debug!(id = %session.id, backend = self.backend.name(), "session saved");
                SaveReceipt {
                    id: session.id.clone(),
                    storage_available: true,
                }
            }
            Err(error) => {
                warn!(id = %session.id, %error, "session storage unavailable");
                SaveReceipt {
                    id: session.id.clone(),
                    storage_available: false,
                }
            }
        }
    }

    /// Fetch a session by id.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if no session has this id, or
    /// [`Error::StorageUnavailable`] if the backend cannot be read.
    pub async fn get(&self, id: &str) -> Result<QuerySession> {
        self.bounded("get", self.backend.get(id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    /// Most recent sessions first, optionally filtered by user.
    ///
    /// # Errors
    /// Returns [`Error::StorageUnavailable`] if the backend cannot be read.
    pub async fn list_recent(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SessionSummary>> {
        let sessions = self
            .bounded("list", self.backend.list_recent(user_id, limit))
            .await?;
        Ok(sessions.iter().map(SessionSummary::from).collect())
    }

    /// Sessions whose query contains `text`, ignoring case, newest first.
    ///
    /// # Errors
    /// Returns [`Error::StorageUnavailable`] if the backend cannot be read.
    pub async fn search(
        &self,
        user_id: Option<&str>,
        text: &str,
        limit: usize,
    ) -> Result<Vec<SessionSummary>> {
        let sessions = self
            .bounded("search", self.backend.search(user_id, text, limit))
            .await?;
        Ok(sessions.iter().map(SessionSummary::from).collect())
    }

    /// Delete a session, returning whether it existed.
    ///
    /// # Errors
    /// Returns [`Error::StorageUnavailable`] if the backend rejects the delete.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.bounded("delete", self.backend.delete(id)).await
    }

    /// Aggregate statistics over all sessions.
    ///
    /// # Errors
    /// Returns [`Error::StorageUnavailable`] if the backend cannot be read.
    pub async fn stats(&self) -> Result<SessionStats> {
        self.bounded("stats", self.backend.stats()).await
    }
}

/// Fold timestamps and processing times into [`SessionStats`].
pub(crate) fn summarize(rows: impl IntoIterator<Item = (u64, DateTime<Utc>)>) -> SessionStats {
    let mut stats = SessionStats::default();
    let mut total_ms: u128 = 0;
    for (processing_time_ms, created_at) in rows {
        stats.total_sessions += 1;
        total_ms += u128::from(processing_time_ms);
        stats.first_query_time = Some(
            stats
                .first_query_time
                .map_or(created_at, |first| first.min(created_at)),
        );
        stats.last_query_time = Some(
            stats
                .last_query_time
                .map_or(created_at, |last| last.max(created_at)),
        );
    }
    if stats.total_sessions > 0 {
        stats.avg_processing_time_ms = total_ms as f64 / stats.total_sessions as f64;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn summarize_tracks_bounds_and_mean() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let stats = summarize([(100, late), (300, early)]);

        assert_eq!(stats.total_sessions, 2);
        assert!((stats.avg_processing_time_ms - 200.0).abs() < f64::EPSILON);
        assert_eq!(stats.first_query_time, Some(early));
        assert_eq!(stats.last_query_time, Some(late));
    }

    #[test]
    fn summarize_empty_is_default() {
        let stats = summarize(Vec::new());
        assert_eq!(stats, SessionStats::default());
    }
}
