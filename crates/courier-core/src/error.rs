//! Error types for Courier

use thiserror::Error;

use crate::types::DeliveryMode;

/// Errors returned by a messaging client for listing and querying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Transport-level failure (timeout, connection reset, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// The network refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The client does not implement this operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A response could not be decoded into messages
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Abnormal termination of a push subscription.
///
/// Fatal to streaming mode; the engine falls back to polling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamFailure {
    /// The client cannot offer live delivery
    #[error("Streaming unsupported: {0}")]
    Unsupported(String),

    /// Subscription setup or mid-stream network fault
    #[error("Stream network error: {0}")]
    Network(String),

    /// The server refused or revoked the subscription
    #[error("Stream rejected: {0}")]
    Rejected(String),

    /// The subscription ended without being cancelled
    #[error("Stream closed unexpectedly")]
    Closed,
}

impl From<ClientError> for StreamFailure {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Network(msg) | ClientError::Malformed(msg) => StreamFailure::Network(msg),
            ClientError::Rejected(msg) => StreamFailure::Rejected(msg),
            ClientError::Unsupported(msg) => StreamFailure::Unsupported(msg),
        }
    }
}

/// Main error type for Courier operations
#[derive(Error, Debug)]
pub enum CourierError {
    /// Messaging client failure that escaped local recovery
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested mode change is not allowed
    #[error("Invalid mode transition: {from} -> {to}")]
    InvalidTransition {
        /// Current mode
        from: DeliveryMode,
        /// Requested mode
        to: DeliveryMode,
    },

    /// Consecutive poll cycle failures exceeded the configured limit
    #[error("Retry budget exhausted after {failures} consecutive cycle failures")]
    RetryBudgetExhausted {
        /// Number of consecutive failed cycles
        failures: u32,
    },
}

/// Result type alias using CourierError
pub type CourierResult<T> = Result<T, CourierError>;
