//! Directory-backed messaging client.
//!
//! A spool is a directory holding one `<conversation_id>.jsonl` file per
//! conversation. Each line is one message:
//!
//! ```text
//! {"id":"m1","sender":"0xabc","sent_at_ms":1700000000000,"content":"hello"}
//! ```
//!
//! Spools are pull-only, so a listener on a spool always falls back to
//! polling. Files can be appended to while the listener runs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::trace;

use courier_core::{
    CandidateStream, ClientError, ConversationHandle, MessageCandidate, MessagingClient,
    QueryOrder, StreamFailure,
};

/// File extension of conversation files
const SPOOL_EXTENSION: &str = "jsonl";

/// One line of a conversation file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoolEntry {
    /// Message id, unique within the conversation
    pub id: String,
    /// Sender address
    pub sender: String,
    /// Network-assigned send time
    pub sent_at_ms: i64,
    /// Message body
    pub content: String,
    /// Filled in from the file name
    #[serde(skip)]
    pub conversation_id: String,
}

impl MessageCandidate for SpoolEntry {
    fn message_id(&self) -> &str {
        &self.id
    }

    fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    fn sender_id(&self) -> &str {
        &self.sender
    }

    fn sent_at_millis(&self) -> i64 {
        self.sent_at_ms
    }

    fn content(&self) -> Bytes {
        Bytes::from(self.content.clone())
    }
}

/// Messaging client reading conversations from a spool directory.
#[derive(Debug, Clone)]
pub struct SpoolClient {
    dir: PathBuf,
}

impl SpoolClient {
    /// Create a client over `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Spool directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn conversation_path(&self, conversation: &ConversationHandle) -> PathBuf {
        self.dir
            .join(format!("{}.{}", conversation.id.as_str(), SPOOL_EXTENSION))
    }
}

/// Parse a conversation file, failing on the first malformed line.
fn parse_entries(conversation_id: &str, content: &str) -> Result<Vec<SpoolEntry>, ClientError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let mut entry: SpoolEntry = serde_json::from_str(line).map_err(|e| {
                ClientError::Malformed(format!("{} line {}: {}", conversation_id, index + 1, e))
            })?;
            entry.conversation_id = conversation_id.to_string();
            Ok(entry)
        })
        .collect()
}

impl MessagingClient for SpoolClient {
    type Candidate = SpoolEntry;

    async fn stream_all_messages(
        &self,
    ) -> Result<CandidateStream<'_, SpoolEntry>, StreamFailure> {
        Err(StreamFailure::Unsupported(
            "spool directories are pull-only".into(),
        ))
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationHandle>, ClientError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            ClientError::Network(format!("cannot read spool {}: {}", self.dir.display(), e))
        })?;

        let mut conversations = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SPOOL_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                conversations.push(ConversationHandle::new(stem));
            }
        }

        conversations.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(conversations)
    }

    async fn query_messages(
        &self,
        conversation: &ConversationHandle,
        since_millis: i64,
        page_size: u32,
        order: QueryOrder,
    ) -> Result<Vec<SpoolEntry>, ClientError> {
        let path = self.conversation_path(conversation);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            // Removed between listing and query
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ClientError::Network(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut messages: Vec<SpoolEntry> = parse_entries(conversation.id.as_str(), &content)?
            .into_iter()
            .filter(|entry| entry.sent_at_ms >= since_millis)
            .collect();

        match order {
            QueryOrder::NewestFirst => messages.sort_by(|a, b| b.sent_at_ms.cmp(&a.sent_at_ms)),
            QueryOrder::OldestFirst => messages.sort_by(|a, b| a.sent_at_ms.cmp(&b.sent_at_ms)),
        }
        messages.truncate(page_size as usize);

        trace!(
            conversation_id = %conversation.id,
            since_millis,
            returned = messages.len(),
            "Queried spool conversation"
        );
        Ok(messages)
    }
}
