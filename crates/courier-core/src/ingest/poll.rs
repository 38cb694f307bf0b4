//! Periodic pull ingestion.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{sleep_or_cancel, CandidateHandler};
use crate::client::{MessageCandidate, MessagingClient};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{ClientError, CourierError, CourierResult};
use crate::types::{PollWindow, QueryOrder};
use crate::window::PollWindowPlanner;

/// How a single cycle ended
enum CycleOutcome {
    Completed { conversations: usize },
    Cancelled,
}

/// Lists conversations and queries each one on a fixed interval.
pub struct PollIngestor {
    page_size: u32,
    poll_interval: Duration,
    error_backoff: Duration,
    max_consecutive_failures: Option<u32>,
    clock: Arc<dyn Clock>,
}

impl PollIngestor {
    /// Create an ingestor from the engine config
    pub fn new(config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            page_size: config.page_size,
            poll_interval: config.poll_interval(),
            error_backoff: config.poll_error_backoff(),
            max_consecutive_failures: config.max_consecutive_cycle_failures,
            clock,
        }
    }

    /// Run poll cycles until cancelled.
    ///
    /// A failed conversation query is logged and skipped. A failed listing
    /// fails the whole cycle, which backs off and retries; the only error
    /// returned is [`CourierError::RetryBudgetExhausted`], and only when a
    /// failure budget is configured.
    pub async fn run<C, H>(
        &self,
        client: &C,
        handler: &mut H,
        planner: &mut PollWindowPlanner,
        cancel: &CancellationToken,
    ) -> CourierResult<()>
    where
        C: MessagingClient,
        H: CandidateHandler,
    {
        let mut consecutive_failures: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let cycle_time = self.clock.now_millis();
            let window = planner.plan(cycle_time);

            let delay = match self.run_cycle(client, handler, window, cancel).await {
                Ok(CycleOutcome::Cancelled) => break,
                Ok(CycleOutcome::Completed { conversations }) => {
                    consecutive_failures = 0;
                    handler.evict_stale(cycle_time);
                    planner.complete_cycle(cycle_time);
                    handler.on_cycle_completed(window, conversations);
                    self.poll_interval
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    warn!(
                        error = %e,
                        consecutive_failures,
                        backoff_ms = self.error_backoff.as_millis() as u64,
                        "Poll cycle failed, backing off"
                    );
                    handler.evict_stale(cycle_time);
                    handler.on_cycle_failed(&e, consecutive_failures);

                    if let Some(max) = self.max_consecutive_failures {
                        if consecutive_failures >= max {
                            return Err(CourierError::RetryBudgetExhausted {
                                failures: consecutive_failures,
                            });
                        }
                    }
                    self.error_backoff
                }
            };

            if !sleep_or_cancel(delay, cancel).await {
                break;
            }
        }

        debug!("Poll loop stopped");
        Ok(())
    }

    async fn run_cycle<C, H>(
        &self,
        client: &C,
        handler: &mut H,
        window: PollWindow,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, ClientError>
    where
        C: MessagingClient,
        H: CandidateHandler,
    {
        let conversations = client.list_conversations().await?;
        debug!(
            conversations = conversations.len(),
            window_start = window.query_start_millis,
            window_end = window.query_end_millis,
            "Polling conversations"
        );
        handler.on_conversations_listed(&conversations);

        for conversation in &conversations {
            if cancel.is_cancelled() {
                return Ok(CycleOutcome::Cancelled);
            }

            let messages = match client
                .query_messages(
                    conversation,
                    window.query_start_millis,
                    self.page_size,
                    QueryOrder::NewestFirst,
                )
                .await
            {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(conversation_id = %conversation.id, error = %e, "Conversation query failed");
                    handler.on_query_failed(&conversation.id, &e);
                    continue;
                }
            };

            // Results of a query that was in flight at cancellation are dropped
            if cancel.is_cancelled() {
                return Ok(CycleOutcome::Cancelled);
            }

            for message in messages {
                handler.on_candidate(message.to_record());
            }
        }

        Ok(CycleOutcome::Completed {
            conversations: conversations.len(),
        })
    }
}
