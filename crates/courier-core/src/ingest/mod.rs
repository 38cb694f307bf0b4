//! Ingestors: the two ways candidates reach the engine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  StreamIngestor: one long-lived push subscription                │
//! │  └── every item ──▶ CandidateHandler::on_candidate               │
//! │                                                                  │
//! │  PollIngestor: list → query each conversation → sleep            │
//! │  ├── every listing ──▶ CandidateHandler::on_conversations_listed │
//! │  └── every result ──▶ CandidateHandler::on_candidate             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Neither ingestor deduplicates or remembers anything across runs; all
//! cross-cycle state belongs to the engine and reaches them through the
//! handler and the window planner.

mod poll;
mod stream;

pub use poll::PollIngestor;
pub use stream::StreamIngestor;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::types::{ConversationHandle, ConversationId, MessageRecord, PollWindow};

/// Receives what an ingestor observes.
pub trait CandidateHandler {
    /// A message was observed (possibly a duplicate)
    fn on_candidate(&mut self, record: MessageRecord);

    /// Time to drop dedup entries past the retention horizon
    fn evict_stale(&mut self, now_millis: i64);

    /// A poll cycle listed these conversations
    fn on_conversations_listed(&mut self, _conversations: &[ConversationHandle]) {}

    /// A poll cycle finished querying every listed conversation
    fn on_cycle_completed(&mut self, _window: PollWindow, _conversations: usize) {}

    /// A poll cycle could not list conversations
    fn on_cycle_failed(&mut self, _error: &ClientError, _consecutive_failures: u32) {}

    /// One conversation's query failed; the cycle carries on
    fn on_query_failed(&mut self, _conversation_id: &ConversationId, _error: &ClientError) {}
}

/// Sleep for `duration` unless cancelled first. Returns false on cancellation.
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
