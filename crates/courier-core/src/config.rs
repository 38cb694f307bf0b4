//! Engine configuration.
//!
//! All durations are expressed in milliseconds so the config file maps
//! one-to-one onto the recognized options.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CourierError, CourierResult};

/// Default safety overlap between consecutive poll windows.
pub const DEFAULT_OVERLAP_MILLIS: u64 = 5_000;

/// Default sleep between successful poll cycles.
pub const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 5_000;

/// Default sleep after a cycle whose conversation listing failed.
pub const DEFAULT_POLL_ERROR_BACKOFF_MILLIS: u64 = 10_000;

/// Default dedup horizon (1 hour).
pub const DEFAULT_DEDUP_RETENTION_MILLIS: u64 = 3_600_000;

/// Default page size for per-conversation message queries.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Default period of dedup eviction while streaming.
pub const DEFAULT_STREAM_EVICT_INTERVAL_MILLIS: u64 = 60_000;

/// Configuration for a [`ReconciliationEngine`](crate::ReconciliationEngine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Trailing slice re-queried each cycle to avoid boundary loss
    pub overlap_millis: u64,
    /// Sleep between poll cycles
    pub poll_interval_millis: u64,
    /// Sleep after a failed cycle
    pub poll_error_backoff_millis: u64,
    /// How long a delivered key is remembered
    pub dedup_retention_millis: u64,
    /// Maximum messages fetched per conversation per cycle
    pub page_size: u32,
    /// Period of dedup eviction while in streaming mode
    pub stream_evict_interval_millis: u64,
    /// Start in streaming mode; when false the engine polls from the start
    pub streaming_enabled: bool,
    /// Give up after this many consecutive failed cycles (None = never)
    pub max_consecutive_cycle_failures: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            overlap_millis: DEFAULT_OVERLAP_MILLIS,
            poll_interval_millis: DEFAULT_POLL_INTERVAL_MILLIS,
            poll_error_backoff_millis: DEFAULT_POLL_ERROR_BACKOFF_MILLIS,
            dedup_retention_millis: DEFAULT_DEDUP_RETENTION_MILLIS,
            page_size: DEFAULT_PAGE_SIZE,
            stream_evict_interval_millis: DEFAULT_STREAM_EVICT_INTERVAL_MILLIS,
            streaming_enabled: true,
            max_consecutive_cycle_failures: None,
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> CourierResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or spin the engine.
    pub fn validate(&self) -> CourierResult<()> {
        if self.page_size == 0 {
            return Err(CourierError::Config("page_size must be at least 1".into()));
        }
        if self.poll_interval_millis == 0 {
            return Err(CourierError::Config(
                "poll_interval_millis must be greater than 0".into(),
            ));
        }
        if self.stream_evict_interval_millis == 0 {
            return Err(CourierError::Config(
                "stream_evict_interval_millis must be greater than 0".into(),
            ));
        }
        if self.max_consecutive_cycle_failures == Some(0) {
            return Err(CourierError::Config(
                "max_consecutive_cycle_failures must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }

    /// Poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    /// Error backoff as a Duration
    pub fn poll_error_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_error_backoff_millis)
    }

    /// Streaming eviction period as a Duration
    pub fn stream_evict_interval(&self) -> Duration {
        Duration::from_millis(self.stream_evict_interval_millis)
    }
}
