//! Delivery reconciliation engine.
//!
//! Owns every piece of cross-cycle state (dedup cache, conversation
//! registry, poll window planner) and drives one ingestor at a time.
//!
//! ## State machine
//!
//! ```text
//!             StreamFailure
//! Streaming ───────────────▶ Polling
//!     │                         │
//!     │ cancel                  │ cancel
//!     ▼                         ▼
//!  Stopped ◀────────────────────┘
//! ```
//!
//! The Streaming → Polling edge is one-way for the life of a run. Both
//! ingestors feed the same `deliver` path, so a message seen by the stream
//! and again by a later poll (or twice across overlapping windows) reaches
//! the sink once.

mod events;

pub use events::{EngineEvent, RunSummary};

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{MessageSink, MessagingClient};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::dedup::DedupCache;
use crate::error::{ClientError, CourierError, CourierResult};
use crate::ingest::{CandidateHandler, PollIngestor, StreamIngestor};
use crate::registry::ConversationRegistry;
use crate::types::{ConversationHandle, ConversationId, DeliveryMode, MessageRecord, PollWindow};
use crate::window::PollWindowPlanner;

/// Capacity of the engine event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Single-use ingestion engine: construct one per run.
///
/// # Example
///
/// ```ignore
/// let engine = ReconciliationEngine::new(EngineConfig::default())?;
/// let mut events = engine.subscribe();
/// let cancel = CancellationToken::new();
///
/// let summary = engine.run(&client, &mut sink, cancel.clone()).await?;
/// println!("delivered {} messages", summary.delivered);
/// ```
pub struct ReconciliationEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    mode: DeliveryMode,
    dedup: DedupCache,
    registry: ConversationRegistry,
    summary: RunSummary,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl ReconciliationEngine {
    /// Create an engine on the system clock
    pub fn new(config: EngineConfig) -> CourierResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an engine reading time from `clock`
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> CourierResult<Self> {
        config.validate()?;
        let mode = if config.streaming_enabled {
            DeliveryMode::Streaming
        } else {
            DeliveryMode::Polling
        };
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            clock,
            mode,
            dedup: DedupCache::new(),
            registry: ConversationRegistry::new(),
            summary: RunSummary::new(mode),
            event_tx,
        })
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Current delivery mode
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Move to `to`. Polling → Streaming is refused.
    pub fn transition(&mut self, to: DeliveryMode, reason: &str) -> CourierResult<()> {
        let from = self.mode;
        if from == to {
            return Ok(());
        }
        if from == DeliveryMode::Polling && to == DeliveryMode::Streaming {
            return Err(CourierError::InvalidTransition { from, to });
        }

        info!(%from, %to, reason, "Delivery mode changed");
        self.mode = to;
        self.summary.final_mode = to;
        let _ = self.event_tx.send(EngineEvent::ModeChanged {
            from,
            to,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Ingest until cancelled, delivering each message to `sink` at most once.
    ///
    /// Transient failures never end the run. The only error is
    /// [`CourierError::RetryBudgetExhausted`], when a budget is configured.
    pub async fn run<C, S>(
        mut self,
        client: &C,
        sink: &mut S,
        cancel: CancellationToken,
    ) -> CourierResult<RunSummary>
    where
        C: MessagingClient,
        S: MessageSink,
    {
        let started_at = self.clock.now_millis();
        let mut planner = PollWindowPlanner::new(started_at, self.config.overlap_millis);
        info!(mode = %self.mode, started_at, "Reconciliation engine started");

        if self.mode == DeliveryMode::Streaming {
            let ingestor =
                StreamIngestor::new(self.config.stream_evict_interval(), self.clock.clone());
            let outcome = {
                let mut delivery = self.delivery(sink);
                ingestor.run(client, &mut delivery, &cancel).await
            };

            match outcome {
                Ok(()) => return Ok(self.stop()),
                Err(failure) => {
                    warn!(error = %failure, "Stream failed, falling back to polling");
                    self.summary.stream_failure = Some(failure.to_string());
                    self.transition(DeliveryMode::Polling, &failure.to_string())?;
                }
            }
        }

        let ingestor = PollIngestor::new(&self.config, self.clock.clone());
        let result = {
            let mut delivery = self.delivery(sink);
            ingestor.run(client, &mut delivery, &mut planner, &cancel).await
        };
        result?;

        Ok(self.stop())
    }

    fn delivery<'a, S: MessageSink>(&'a mut self, sink: &'a mut S) -> Delivery<'a, S> {
        Delivery {
            dedup: &mut self.dedup,
            registry: &mut self.registry,
            summary: &mut self.summary,
            event_tx: &self.event_tx,
            clock: self.clock.as_ref(),
            retention_millis: self.config.dedup_retention_millis,
            sink,
        }
    }

    fn stop(self) -> RunSummary {
        info!(
            mode = %self.mode,
            delivered = self.summary.delivered,
            duplicates = self.summary.duplicates_dropped,
            "Reconciliation engine stopped"
        );
        self.summary
    }
}

/// The engine's `deliver` path, lent to whichever ingestor is active.
struct Delivery<'a, S> {
    dedup: &'a mut DedupCache,
    registry: &'a mut ConversationRegistry,
    summary: &'a mut RunSummary,
    event_tx: &'a broadcast::Sender<EngineEvent>,
    clock: &'a dyn Clock,
    retention_millis: u64,
    sink: &'a mut S,
}

impl<S> Delivery<'_, S> {
    fn observe_conversation(&mut self, conversation_id: &ConversationId) {
        if self.registry.observe(conversation_id) {
            info!(conversation_id = %conversation_id, "New conversation");
            self.summary.conversations_discovered += 1;
            let _ = self.event_tx.send(EngineEvent::ConversationDiscovered {
                conversation_id: conversation_id.clone(),
            });
        }
    }
}

impl<S: MessageSink> CandidateHandler for Delivery<'_, S> {
    fn on_candidate(&mut self, record: MessageRecord) {
        let key = record.dedup_key();
        if !self.dedup.should_deliver(key, self.clock.now_millis()) {
            self.summary.duplicates_dropped += 1;
            return;
        }

        self.observe_conversation(&record.conversation_id);

        debug!(
            message_id = %record.message_id,
            conversation_id = %record.conversation_id,
            "Delivering message"
        );
        self.summary.delivered += 1;
        self.sink.deliver(record);
    }

    fn evict_stale(&mut self, now_millis: i64) {
        self.dedup.evict_older_than(self.retention_millis, now_millis);
    }

    fn on_conversations_listed(&mut self, conversations: &[ConversationHandle]) {
        for conversation in conversations {
            self.observe_conversation(&conversation.id);
        }
    }

    fn on_cycle_completed(&mut self, window: PollWindow, conversations: usize) {
        self.summary.poll_cycles += 1;
        let _ = self.event_tx.send(EngineEvent::CycleCompleted {
            window,
            conversations,
        });
    }

    fn on_cycle_failed(&mut self, error: &ClientError, consecutive_failures: u32) {
        self.summary.cycle_failures += 1;
        let _ = self.event_tx.send(EngineEvent::CycleFailed {
            error: error.to_string(),
            consecutive_failures,
        });
    }

    fn on_query_failed(&mut self, conversation_id: &ConversationId, error: &ClientError) {
        self.summary.query_failures += 1;
        let _ = self.event_tx.send(EngineEvent::QueryFailed {
            conversation_id: conversation_id.clone(),
            error: error.to_string(),
        });
    }
}
