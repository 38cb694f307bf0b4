//! Seams to the outside world: the messaging client the engine reads from
//! and the sink it delivers to.
//!
//! ```text
//! ┌────────────────────┐   candidates   ┌──────────────────────┐  records  ┌─────────────┐
//! │ MessagingClient    │ ─────────────▶ │ ReconciliationEngine │ ────────▶ │ MessageSink │
//! │  stream / list /   │                │  dedup + registry    │           │             │
//! │  query             │                └──────────────────────┘           └─────────────┘
//! └────────────────────┘
//! ```
//!
//! Transport, signing and session bootstrap all live behind
//! [`MessagingClient`]; the engine never sees them.

use std::future::Future;

use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{ClientError, StreamFailure};
use crate::types::{ConversationHandle, ConversationId, MessageId, MessageRecord, QueryOrder};

/// Live subscription produced by [`MessagingClient::stream_all_messages`].
pub type CandidateStream<'a, T> = BoxStream<'a, Result<T, StreamFailure>>;

/// A message as observed by an ingestor, before dedup filtering.
pub trait MessageCandidate {
    /// Network-assigned message id
    fn message_id(&self) -> &str;
    /// Conversation the message was posted to
    fn conversation_id(&self) -> &str;
    /// Sender identity
    fn sender_id(&self) -> &str;
    /// Sent-at timestamp in Unix millis
    fn sent_at_millis(&self) -> i64;
    /// Opaque payload
    fn content(&self) -> Bytes;

    /// Build the immutable record handed to the sink.
    fn to_record(&self) -> MessageRecord {
        MessageRecord {
            message_id: MessageId::new(self.message_id()),
            conversation_id: ConversationId::new(self.conversation_id()),
            sender_id: self.sender_id().to_string(),
            sent_at_millis: self.sent_at_millis(),
            content: self.content(),
        }
    }
}

impl MessageCandidate for MessageRecord {
    fn message_id(&self) -> &str {
        self.message_id.as_str()
    }

    fn conversation_id(&self) -> &str {
        self.conversation_id.as_str()
    }

    fn sender_id(&self) -> &str {
        &self.sender_id
    }

    fn sent_at_millis(&self) -> i64 {
        self.sent_at_millis
    }

    fn content(&self) -> Bytes {
        self.content.clone()
    }

    fn to_record(&self) -> MessageRecord {
        self.clone()
    }
}

/// Capability the engine consumes from the messaging network.
pub trait MessagingClient: Send + Sync {
    /// Candidate type produced by this client
    type Candidate: MessageCandidate + Send;

    /// Open one long-lived subscription to every incoming message for the
    /// authenticated identity.
    ///
    /// The returned stream is potentially infinite. A setup error or an
    /// `Err` item is a [`StreamFailure`].
    fn stream_all_messages(
        &self,
    ) -> impl Future<Output = Result<CandidateStream<'_, Self::Candidate>, StreamFailure>> + Send;

    /// List every conversation visible to the identity.
    fn list_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<ConversationHandle>, ClientError>> + Send;

    /// Fetch at most `page_size` messages with `sent_at >= since_millis`.
    fn query_messages(
        &self,
        conversation: &ConversationHandle,
        since_millis: i64,
        page_size: u32,
        order: QueryOrder,
    ) -> impl Future<Output = Result<Vec<Self::Candidate>, ClientError>> + Send;
}

/// Receiver of deduplicated messages.
///
/// Called at most once per dedup key for the engine's lifetime.
pub trait MessageSink {
    /// Take ownership of a delivered record
    fn deliver(&mut self, record: MessageRecord);
}

impl<F> MessageSink for F
where
    F: FnMut(MessageRecord),
{
    fn deliver(&mut self, record: MessageRecord) {
        self(record)
    }
}

/// Sink that forwards records over an unbounded channel.
///
/// Lets a separate task consume deliveries while the engine keeps running.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<MessageRecord>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MessageRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageSink for ChannelSink {
    fn deliver(&mut self, record: MessageRecord) {
        if let Err(e) = self.tx.send(record) {
            warn!(message_id = %e.0.message_id, "Sink receiver dropped, message discarded");
        }
    }
}
