//! Exactly-once filter for delivery events.
//!
//! A key, once recorded, is never reported deliverable again until it ages
//! out of the retention horizon. Eviction is lazy: nothing is removed
//! until [`DedupCache::evict_older_than`] is called.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::types::DedupKey;

/// Mapping from dedup key to the wall-clock time it was first seen.
#[derive(Debug, Default)]
pub struct DedupCache {
    first_seen: HashMap<DedupKey, i64>,
}

impl DedupCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` if unseen.
    ///
    /// Returns true exactly once per key (until evicted); every later call
    /// with the same key returns false and leaves the first-seen time alone.
    pub fn should_deliver(&mut self, key: DedupKey, observed_at_millis: i64) -> bool {
        use std::collections::hash_map::Entry;

        match self.first_seen.entry(key) {
            Entry::Occupied(entry) => {
                trace!(key = %entry.key(), "Duplicate delivery suppressed");
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(observed_at_millis);
                true
            }
        }
    }

    /// Whether `key` is currently remembered
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.first_seen.contains_key(key)
    }

    /// First-seen time of `key`, if remembered
    pub fn first_seen_at(&self, key: &DedupKey) -> Option<i64> {
        self.first_seen.get(key).copied()
    }

    /// Drop entries first seen strictly before `now_millis - horizon_millis`.
    ///
    /// Returns the number of entries removed.
    pub fn evict_older_than(&mut self, horizon_millis: u64, now_millis: i64) -> usize {
        let cutoff = now_millis.saturating_sub(i64::try_from(horizon_millis).unwrap_or(i64::MAX));
        let before = self.first_seen.len();
        self.first_seen.retain(|_, first_seen| *first_seen >= cutoff);
        let evicted = before - self.first_seen.len();
        if evicted > 0 {
            debug!(evicted, remaining = self.first_seen.len(), "Evicted stale dedup entries");
        }
        evicted
    }

    /// Number of remembered keys
    pub fn len(&self) -> usize {
        self.first_seen.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.first_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageId;

    const HOUR: u64 = 3_600_000;

    fn key(id: &str, sent_at: i64) -> DedupKey {
        DedupKey::new(MessageId::new(id), sent_at)
    }

    #[test]
    fn test_first_observation_delivers() {
        let mut cache = DedupCache::new();
        assert!(cache.should_deliver(key("a", 1000), 10));
        assert!(cache.contains(&key("a", 1000)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_repeat_observation_is_dropped() {
        let mut cache = DedupCache::new();
        assert!(cache.should_deliver(key("a", 1000), 10));
        assert!(!cache.should_deliver(key("a", 1000), 20));
        assert!(!cache.should_deliver(key("a", 1000), 30));
        // First-seen time is not refreshed by duplicates
        assert_eq!(cache.first_seen_at(&key("a", 1000)), Some(10));
    }

    #[test]
    fn test_same_id_different_timestamp_is_distinct() {
        let mut cache = DedupCache::new();
        assert!(cache.should_deliver(key("a", 1000), 0));
        assert!(cache.should_deliver(key("a", 2000), 0));
    }

    #[test]
    fn test_eviction_boundary() {
        let now = 10 * HOUR as i64;
        let mut cache = DedupCache::new();
        cache.should_deliver(key("old", 0), now - HOUR as i64 - 1);
        cache.should_deliver(key("fresh", 0), now - HOUR as i64 + 1);

        let evicted = cache.evict_older_than(HOUR, now);

        assert_eq!(evicted, 1);
        assert!(!cache.contains(&key("old", 0)));
        assert!(cache.contains(&key("fresh", 0)));
    }

    #[test]
    fn test_evicted_key_can_be_delivered_again() {
        let mut cache = DedupCache::new();
        cache.should_deliver(key("a", 1), 0);
        cache.evict_older_than(100, 1000);
        assert!(cache.is_empty());
        assert!(cache.should_deliver(key("a", 1), 1000));
    }

    #[test]
    fn test_evict_on_empty_cache_is_noop() {
        let mut cache = DedupCache::new();
        assert_eq!(cache.evict_older_than(HOUR, 0), 0);
    }

    #[test]
    fn test_huge_horizon_does_not_overflow() {
        let mut cache = DedupCache::new();
        cache.should_deliver(key("a", 1), i64::MIN + 5);
        assert_eq!(cache.evict_older_than(u64::MAX, 0), 0);
    }
}
