//! Core types for Courier

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identifier of a conversation on the messaging network
///
/// Opaque to the engine; typically a topic or group id assigned by the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Create a ConversationId from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Network-assigned message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Create a MessageId from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A message surfaced by the engine.
///
/// Immutable once received. Built from whatever candidate type the
/// messaging client produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Network-assigned message id
    pub message_id: MessageId,
    /// Conversation the message belongs to
    pub conversation_id: ConversationId,
    /// Sender identity (address or inbox id)
    pub sender_id: String,
    /// Unix timestamp in milliseconds, as reported by the network
    pub sent_at_millis: i64,
    /// Opaque payload
    pub content: Bytes,
}

impl MessageRecord {
    /// Derive the dedup key for this delivery.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(self.message_id.clone(), self.sent_at_millis)
    }

    /// Content decoded as UTF-8, replacing invalid sequences.
    pub fn content_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

/// Identifies one delivery event within the dedup horizon.
///
/// Two records with equal keys are the same delivery and are surfaced at
/// most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    /// Message id component
    pub message_id: MessageId,
    /// Sent-at component (millis)
    pub sent_at_millis: i64,
}

impl DedupKey {
    /// Create a key from its parts
    pub fn new(message_id: MessageId, sent_at_millis: i64) -> Self {
        Self {
            message_id,
            sent_at_millis,
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.message_id, self.sent_at_millis)
    }
}

/// Time range queried in one poll cycle, in Unix millis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollWindow {
    /// Lower bound passed to the message query (inclusive)
    pub query_start_millis: i64,
    /// "Now" at the time the window was planned
    pub query_end_millis: i64,
}

impl PollWindow {
    /// Whether a timestamp falls inside the window (both ends inclusive)
    pub fn contains(&self, millis: i64) -> bool {
        millis >= self.query_start_millis && millis <= self.query_end_millis
    }
}

/// How the engine is currently receiving messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Live push subscription
    Streaming,
    /// Periodic time-windowed queries
    Polling,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Streaming => write!(f, "streaming"),
            DeliveryMode::Polling => write!(f, "polling"),
        }
    }
}

/// Ordering requested from a message query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryOrder {
    /// Most recent first
    #[default]
    NewestFirst,
    /// Oldest first
    OldestFirst,
}

/// A conversation as returned by the client's listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHandle {
    /// Conversation id
    pub id: ConversationId,
    /// Peer or group label, if the network exposes one
    pub peer: Option<String>,
}

impl ConversationHandle {
    /// Create a handle with no peer label
    pub fn new(id: impl Into<ConversationId>) -> Self {
        Self {
            id: id.into(),
            peer: None,
        }
    }

    /// Attach a peer label
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, sent_at: i64) -> MessageRecord {
        MessageRecord {
            message_id: MessageId::new(id),
            conversation_id: ConversationId::new("c1"),
            sender_id: "0xabc".to_string(),
            sent_at_millis: sent_at,
            content: Bytes::from_static(b"hello"),
        }
    }

    #[test]
    fn test_dedup_key_uses_id_and_timestamp() {
        assert_eq!(record("a", 1000).dedup_key(), record("a", 1000).dedup_key());
        assert_ne!(record("a", 1000).dedup_key(), record("a", 1001).dedup_key());
        assert_ne!(record("a", 1000).dedup_key(), record("b", 1000).dedup_key());
    }

    #[test]
    fn test_dedup_key_ignores_conversation_and_content() {
        let mut other = record("a", 1000);
        other.conversation_id = ConversationId::new("c2");
        other.content = Bytes::from_static(b"different");
        assert_eq!(record("a", 1000).dedup_key(), other.dedup_key());
    }

    #[test]
    fn test_content_text_is_lossy() {
        let mut rec = record("a", 0);
        rec.content = Bytes::from_static(&[0x68, 0x69, 0xff]);
        assert_eq!(rec.content_text(), "hi\u{fffd}");
    }

    #[test]
    fn test_poll_window_contains_is_inclusive() {
        let window = PollWindow {
            query_start_millis: 0,
            query_end_millis: 5000,
        };
        assert!(window.contains(0));
        assert!(window.contains(5000));
        assert!(!window.contains(-1));
        assert!(!window.contains(5001));
    }

    #[test]
    fn test_delivery_mode_display() {
        assert_eq!(DeliveryMode::Streaming.to_string(), "streaming");
        assert_eq!(DeliveryMode::Polling.to_string(), "polling");
    }
}
