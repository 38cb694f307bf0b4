//! Engine event types and run accounting
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │  EngineEvent: notifications about ingestion activity               │
//! │  ├── ModeChanged: Streaming → Polling fallback                     │
//! │  ├── ConversationDiscovered: conversation seen for the first time  │
//! │  ├── CycleCompleted: a poll cycle queried every conversation       │
//! │  ├── CycleFailed: listing failed, backing off                      │
//! │  └── QueryFailed: one conversation's query failed                  │
//! │                                                                    │
//! │  RunSummary: counters returned when a run stops                    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;

use crate::types::{ConversationId, DeliveryMode, PollWindow};

/// Events emitted while the engine runs
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The engine switched delivery mode
    ModeChanged {
        /// Previous mode
        from: DeliveryMode,
        /// New mode
        to: DeliveryMode,
        /// Why the switch happened
        reason: String,
    },
    /// A conversation was listed or delivered to for the first time this run
    ConversationDiscovered {
        /// The new conversation
        conversation_id: ConversationId,
    },
    /// A poll cycle finished
    CycleCompleted {
        /// Window that was queried
        window: PollWindow,
        /// Number of conversations listed
        conversations: usize,
    },
    /// A poll cycle failed to list conversations
    CycleFailed {
        /// Error message
        error: String,
        /// Failures in a row, including this one
        consecutive_failures: u32,
    },
    /// A single conversation query failed
    QueryFailed {
        /// Conversation whose query failed
        conversation_id: ConversationId,
        /// Error message
        error: String,
    },
}

/// Counters for one engine run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Records handed to the sink
    pub delivered: u64,
    /// Candidates dropped as already delivered
    pub duplicates_dropped: u64,
    /// Distinct conversations seen this run
    pub conversations_discovered: u64,
    /// Poll cycles that completed
    pub poll_cycles: u64,
    /// Poll cycles whose listing failed
    pub cycle_failures: u64,
    /// Individual conversation queries that failed
    pub query_failures: u64,
    /// Mode the engine was in when it stopped
    pub final_mode: DeliveryMode,
    /// Stream failure that caused fallback, if any
    pub stream_failure: Option<String>,
}

impl RunSummary {
    pub(crate) fn new(mode: DeliveryMode) -> Self {
        Self {
            delivered: 0,
            duplicates_dropped: 0,
            conversations_discovered: 0,
            poll_cycles: 0,
            cycle_failures: 0,
            query_failures: 0,
            final_mode: mode,
            stream_failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_serializes_mode_lowercase() {
        let summary = RunSummary::new(DeliveryMode::Polling);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"final_mode\":\"polling\""));
        assert!(json.contains("\"stream_failure\":null"));
    }
}
