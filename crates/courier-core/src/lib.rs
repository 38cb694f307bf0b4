//! Courier Core Library
//!
//! Exactly-once message ingestion from a decentralized messaging network,
//! whether the network pushes messages live, has to be polled, or flips
//! between the two.
//!
//! ## Overview
//!
//! The [`ReconciliationEngine`] first tries a live subscription. If that
//! fails for good it falls back to polling every conversation on a fixed
//! interval with overlapping time windows. Every candidate from either path
//! goes through one dedup cache before it reaches the [`MessageSink`], so a
//! message is surfaced once no matter how many times it is observed.
//!
//! ## Quick Start
//!
//! ```ignore
//! use courier_core::{ChannelSink, EngineConfig, ReconciliationEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! let engine = ReconciliationEngine::new(EngineConfig::default())?;
//! let (mut sink, mut rx) = ChannelSink::new();
//! let cancel = CancellationToken::new();
//!
//! tokio::spawn(async move {
//!     while let Some(msg) = rx.recv().await {
//!         println!("{}: {}", msg.sender_id, msg.content_text());
//!     }
//! });
//!
//! let summary = engine.run(&client, &mut sink, cancel).await?;
//! ```

pub mod client;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod registry;
pub mod types;
pub mod window;

// Re-exports
pub use client::{CandidateStream, ChannelSink, MessageCandidate, MessageSink, MessagingClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use dedup::DedupCache;
pub use engine::{EngineEvent, ReconciliationEngine, RunSummary};
pub use error::{ClientError, CourierError, CourierResult, StreamFailure};
pub use ingest::{CandidateHandler, PollIngestor, StreamIngestor};
pub use registry::ConversationRegistry;
pub use types::*;
pub use window::{next_window, PollWindowPlanner};

pub use tokio_util::sync::CancellationToken;
