//! Error types for Proxima
//!
//! The beacon pipeline itself is total: classification, policy, smoothing
//! and aggregation never fail. Errors only come from configuration,
//! the wire codec and the transports.

use thiserror::Error;

/// Core Proxima errors
#[derive(Error, Debug)]
pub enum ProximaError {
    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    // Configuration errors
    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Transport errors
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Queue full")]
    QueueFull,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for ProximaError {
    fn from(e: serde_json::Error) -> Self {
        ProximaError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for ProximaError {
    fn from(e: std::io::Error) -> Self {
        ProximaError::Io(e.to_string())
    }
}

/// Result type for Proxima operations
pub type ProximaResult<T> = Result<T, ProximaError>;
