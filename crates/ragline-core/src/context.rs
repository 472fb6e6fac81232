use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{Span, info_span};
use uuid::Uuid;

/// Stage of a single request as it moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Request accepted, nothing run yet
    Received = 0,
    /// Embedding query variants
    Embedding = 1,
    /// Searching the vector store
    Retrieving = 2,
    /// Reordering candidates
    Reranking = 3,
    /// Calling the generation model
    Generating = 4,
    /// Saving the session
    Persisting = 5,
    /// Finished normally
    Done = 6,
    /// Finished with the templated fallback answer
    ErrorFallback = 7,
}

impl Stage {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Embedding,
            2 => Self::Retrieving,
            3 => Self::Reranking,
            4 => Self::Generating,
            5 => Self::Persisting,
            6 => Self::Done,
            7 => Self::ErrorFallback,
            _ => Self::Received,
        }
    }

    /// Stage name as it appears in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Embedding => "embedding",
            Self::Retrieving => "retrieving",
            Self::Reranking => "reranking",
            Self::Generating => "generating",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::ErrorFallback => "error_fallback",
        }
    }

    /// Whether a stage failure may divert the request to the fallback answer.
    ///
    /// Only stages that talk to an upstream model or the vector store can fail
    /// over; the global timeout bypasses this check.
    pub fn can_fail_over(self) -> bool {
        matches!(self, Self::Embedding | Self::Retrieving | Self::Generating)
    }

    /// Whether the request has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::ErrorFallback)
    }
}

impl Display for Stage {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Per-request state shared by every stage of one `answer` call.
#[derive(Debug)]
pub struct RequestContext {
    correlation_id: Uuid,
    started: Instant,
    stage: AtomicU8,
    degraded: AtomicBool,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Create a context with a fresh correlation id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    /// Create a context with a known correlation id.
    pub fn with_id(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            started: Instant::now(),
            stage: AtomicU8::new(Stage::Received as u8),
            degraded: AtomicBool::new(false),
        }
    }

    /// Correlation id attached to every log line of this request.
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Time since the request was received, on the runtime clock.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Milliseconds since the request was received.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Part of `budget` not yet used by this request.
    pub fn remaining(&self, budget: Duration) -> Duration {
        budget.saturating_sub(self.elapsed())
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        Stage::from_u8(self.stage.load(Ordering::Acquire))
    }

    /// Move to `next`. Terminal stages are sticky.
    pub fn enter(&self, next: Stage) {
        let current = self.stage();
        if current.is_terminal() {
            return;
        }
        self.stage.store(next as u8, Ordering::Release);
        tracing::debug!(from = %current, to = %next, "stage transition");
    }

    /// Record that some part of the request ran in degraded mode.
    pub fn mark_degraded(&self) {
        self.degraded.store(true, Ordering::Release);
    }

    /// Whether any part of the request ran in degraded mode.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Span carrying the correlation id.
    pub fn span(&self) -> Span {
        info_span!("request", correlation_id = %self.correlation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[test]
    fn stages_advance_in_order() {
        let context = RequestContext::new();
        assert_eq!(context.stage(), Stage::Received);
        context.enter(Stage::Embedding);
        context.enter(Stage::Retrieving);
        assert_eq!(context.stage(), Stage::Retrieving);
        assert_eq!(context.stage().to_string(), "retrieving");
    }

    #[test]
    fn terminal_stage_is_sticky() {
        let context = RequestContext::new();
        context.enter(Stage::Generating);
        context.enter(Stage::ErrorFallback);
        context.enter(Stage::Persisting);
        assert_eq!(context.stage(), Stage::ErrorFallback);
    }

    #[test]
    fn only_upstream_stages_fail_over() {
        assert!(Stage::Embedding.can_fail_over());
        assert!(Stage::Retrieving.can_fail_over());
        assert!(Stage::Generating.can_fail_over());
        assert!(!Stage::Reranking.can_fail_over());
        assert!(!Stage::Persisting.can_fail_over());
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_follows_the_runtime_clock() {
        let context = RequestContext::new();
        advance(Duration::from_millis(250)).await;
        assert_eq!(context.elapsed_ms(), 250);
        assert_eq!(
            context.remaining(Duration::from_millis(1_000)),
            Duration::from_millis(750)
        );
        assert_eq!(context.remaining(Duration::from_millis(100)), Duration::ZERO);
    }

    #[test]
    fn degraded_flag_latches() {
        let context = RequestContext::new();
        assert!(!context.is_degraded());
        context.mark_degraded();
        assert!(context.is_degraded());
    }
}
