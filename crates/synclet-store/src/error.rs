//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during connector operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Address length does not fit the operation.
    #[error("invalid address {address}: {reason} (depth {depth})")]
    InvalidAddress {
        address: String,
        depth: usize,
        reason: &'static str,
    },

    /// Core error (binding misuse, decoding).
    #[error("core error: {0}")]
    Core(#[from] synclet_core::CoreError),

    /// Failure reported by a storage backend.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
