//! Error types for Synclet Core.

use thiserror::Error;

/// Core errors raised while decoding wire data or binding components.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("malformed protocol node: {0}")]
    MalformedNode(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// No local timestamp can sort after the one stored at a leaf.
    #[error("cannot mint a timestamp after {0:?}")]
    TimestampExhausted(String),

    /// A connector or transport was handed to a second synclet.
    #[error("{kind} is already bound to synclet {owner}")]
    AlreadyBound { kind: &'static str, owner: String },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
