//! Error types for Synclet.

use synclet_core::CoreError;
use synclet_store::StoreError;
use synclet_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during Synclet operations.
#[derive(Debug, Error)]
pub enum SyncletError {
    /// Decoding error or binding misuse.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Connector error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Transport, packet or queue error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The data and meta connectors describe trees of different depths.
    #[error("connector depth mismatch: data={data}, meta={meta}")]
    DepthMismatch { data: usize, meta: usize },

    /// The replica id cannot be used on the wire.
    #[error("invalid replica id {0:?}")]
    InvalidId(String),
}

impl SyncletError {
    /// Whether this error reports a component bound to a second synclet.
    pub fn is_already_bound(&self) -> bool {
        matches!(
            self,
            SyncletError::Core(CoreError::AlreadyBound { .. })
                | SyncletError::Store(StoreError::Core(CoreError::AlreadyBound { .. }))
                | SyncletError::Sync(SyncError::Core(CoreError::AlreadyBound { .. }))
        )
    }
}

/// Result type for Synclet operations.
pub type Result<T> = std::result::Result<T, SyncletError>;
