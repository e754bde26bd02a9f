//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// A packet did not match `<peer> <message id> <index> <total> <payload>`.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// Connector operation failed.
    #[error("store error: {0}")]
    Store(#[from] synclet_store::StoreError),

    /// Message decoding or binding failed.
    #[error("core error: {0}")]
    Core(#[from] synclet_core::CoreError),

    /// The sync queue worker is gone.
    #[error("sync queue closed")]
    QueueClosed,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
