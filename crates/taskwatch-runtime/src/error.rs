//! Error types for the runtime engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot store write rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to persist snapshot after {attempts} attempts: {source}")]
    Persist {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("snapshot could not be encoded: {0}")]
    Encode(#[from] taskwatch_core::SnapshotError),

    #[error("engine has been shut down")]
    Disposed,

    #[error("blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Boundary validation failure for an inbound message. Nothing reaches the
/// engine when one of these is returned.
#[derive(Debug, Error)]
pub enum InboundError {
    #[error("request is not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid params: {0}")]
    Params(#[source] serde_json::Error),

    #[error("origin {origin:?} is not an absolute URL: {reason}")]
    Origin { origin: String, reason: String },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
}

impl InboundError {
    /// JSON-RPC 2.0 error code.
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse(_) => -32700,
            Self::UnknownMethod(_) => -32601,
            _ => -32602,
        }
    }
}
