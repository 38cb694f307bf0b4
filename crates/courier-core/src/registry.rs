//! Known-conversation tracking.
//!
//! Purely diagnostic: membership never gates delivery.

use std::collections::HashSet;

use crate::types::ConversationId;

/// Grow-only set of conversations seen during one engine run
#[derive(Debug, Default)]
pub struct ConversationRegistry {
    known: HashSet<ConversationId>,
}

impl ConversationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `conversation_id` as known. Returns true on the first call for it.
    pub fn observe(&mut self, conversation_id: &ConversationId) -> bool {
        if self.known.contains(conversation_id) {
            return false;
        }
        self.known.insert(conversation_id.clone())
    }

    /// Whether the conversation has been observed
    pub fn is_known(&self, conversation_id: &ConversationId) -> bool {
        self.known.contains(conversation_id)
    }

    /// Number of known conversations
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// Whether no conversation has been observed yet
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_reports_new_once() {
        let mut registry = ConversationRegistry::new();
        let c1 = ConversationId::new("c1");

        assert!(registry.observe(&c1));
        assert!(!registry.observe(&c1));
        assert!(!registry.observe(&c1));
        assert!(registry.is_known(&c1));
    }

    #[test]
    fn test_membership_only_grows() {
        let mut registry = ConversationRegistry::new();
        for id in ["c1", "c2", "c1", "c3", "c2"] {
            registry.observe(&ConversationId::new(id));
        }
        assert_eq!(registry.len(), 3);
        assert!(!registry.is_known(&ConversationId::new("c4")));
    }
}
