//! Push-subscription ingestion.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::CandidateHandler;
use crate::client::{MessageCandidate, MessagingClient};
use crate::clock::Clock;
use crate::error::StreamFailure;

/// Consumes a client's live subscription and forwards every item.
///
/// `run` only returns `Err` when the subscription terminates abnormally;
/// it returns `Ok(())` only when cancelled.
pub struct StreamIngestor {
    evict_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl StreamIngestor {
    /// Create an ingestor that evicts stale dedup entries every `evict_interval`
    pub fn new(evict_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            evict_interval,
            clock,
        }
    }

    /// Subscribe and forward candidates until failure or cancellation.
    pub async fn run<C, H>(
        &self,
        client: &C,
        handler: &mut H,
        cancel: &CancellationToken,
    ) -> Result<(), StreamFailure>
    where
        C: MessagingClient,
        H: CandidateHandler,
    {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            opened = client.stream_all_messages() => opened?,
        };
        info!("Subscribed to message stream");

        // Without polling there is no per-cycle eviction, so bound the
        // cache on a timer instead.
        let mut evict = tokio::time::interval(self.evict_interval);
        evict.set_missed_tick_behavior(MissedTickBehavior::Delay);
        evict.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Stream cancelled");
                    return Ok(());
                }
                _ = evict.tick() => {
                    handler.evict_stale(self.clock.now_millis());
                }
                item = stream.next() => match item {
                    Some(Ok(candidate)) => {
                        debug!(
                            message_id = candidate.message_id(),
                            conversation_id = candidate.conversation_id(),
                            "Stream candidate"
                        );
                        handler.on_candidate(candidate.to_record());
                    }
                    Some(Err(failure)) => return Err(failure),
                    None => return Err(StreamFailure::Closed),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ClientError;
    use crate::types::{ConversationHandle, ConversationId, MessageId, MessageRecord, QueryOrder};
    use bytes::Bytes;
    use futures::stream;

    fn record(id: &str) -> MessageRecord {
        MessageRecord {
            message_id: MessageId::new(id),
            conversation_id: ConversationId::new("c1"),
            sender_id: "s".into(),
            sent_at_millis: 1,
            content: Bytes::new(),
        }
    }

    /// Yields a fixed sequence of items, then optionally hangs forever.
    struct FixedStream {
        items: Vec<Result<MessageRecord, StreamFailure>>,
        hang_after: bool,
    }

    impl MessagingClient for FixedStream {
        type Candidate = MessageRecord;

        async fn stream_all_messages(
            &self,
        ) -> Result<crate::client::CandidateStream<'_, MessageRecord>, StreamFailure> {
            let items = stream::iter(self.items.clone());
            if self.hang_after {
                Ok(items.chain(stream::pending()).boxed())
            } else {
                Ok(items.boxed())
            }
        }

        async fn list_conversations(&self) -> Result<Vec<ConversationHandle>, ClientError> {
            Ok(vec![])
        }

        async fn query_messages(
            &self,
            _conversation: &ConversationHandle,
            _since_millis: i64,
            _page_size: u32,
            _order: QueryOrder,
        ) -> Result<Vec<MessageRecord>, ClientError> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct Recorder {
        candidates: Vec<MessageRecord>,
        evictions: usize,
    }

    impl CandidateHandler for Recorder {
        fn on_candidate(&mut self, record: MessageRecord) {
            self.candidates.push(record);
        }

        fn evict_stale(&mut self, _now_millis: i64) {
            self.evictions += 1;
        }
    }

    fn ingestor() -> StreamIngestor {
        StreamIngestor::new(Duration::from_secs(60), Arc::new(ManualClock::new(0)))
    }

    #[tokio::test]
    async fn test_forwards_raw_candidates_without_dedup() {
        let client = FixedStream {
            items: vec![Ok(record("a")), Ok(record("a")), Ok(record("b"))],
            hang_after: false,
        };
        let mut recorder = Recorder::default();

        let result = ingestor()
            .run(&client, &mut recorder, &CancellationToken::new())
            .await;

        assert_eq!(result, Err(StreamFailure::Closed));
        assert_eq!(recorder.candidates.len(), 3);
    }

    #[tokio::test]
    async fn test_mid_stream_error_is_failure() {
        let client = FixedStream {
            items: vec![
                Ok(record("a")),
                Err(StreamFailure::Network("reset".into())),
                Ok(record("b")),
            ],
            hang_after: false,
        };
        let mut recorder = Recorder::default();

        let result = ingestor()
            .run(&client, &mut recorder, &CancellationToken::new())
            .await;

        assert_eq!(result, Err(StreamFailure::Network("reset".into())));
        assert_eq!(recorder.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_returns_ok() {
        let client = FixedStream {
            items: vec![Ok(record("a"))],
            hang_after: true,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut recorder = Recorder::default();

        assert_eq!(ingestor().run(&client, &mut recorder, &cancel).await, Ok(()));
        assert!(recorder.candidates.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_while_waiting_is_not_failure() {
        let client = FixedStream {
            items: vec![Ok(record("a"))],
            hang_after: true,
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let mut recorder = Recorder::default();

        assert_eq!(ingestor().run(&client, &mut recorder, &cancel).await, Ok(()));
        assert_eq!(recorder.candidates.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_periodically_while_idle() {
        let client = FixedStream {
            items: vec![],
            hang_after: true,
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(150)).await;
            trigger.cancel();
        });
        let mut recorder = Recorder::default();

        ingestor().run(&client, &mut recorder, &cancel).await.unwrap();
        // Ticks at 60s and 120s
        assert_eq!(recorder.evictions, 2);
    }
}
