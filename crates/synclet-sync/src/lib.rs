//! # Synclet Sync
//!
//! Moving protocol messages between replicas and reconciling trees.
//!
//! ## Overview
//!
//! - [`packets`] fragments messages into size-bounded packets and
//!   reassembles them, tolerating reordering and duplicates.
//! - [`queue`] serializes every protocol-driven connector access of one
//!   replica.
//! - [`transport`] is the raw packet pipe, with an in-memory implementation.
//! - [`protocol`] decides, for one address, whether two replicas agree and
//!   what to answer if they do not.
//!
//! ## Message Flow
//!
//! ```text
//! Replica A                                   Replica B
//!   |-------- Digest(root) ------------------>|   digests differ
//!   |<------- SubNodes{children}, complete ---|   one level expanded
//!   |-------- SubNodes{newer leaves} -------->|   apply, or push back
//!   |<------- SubNodes{older leaves}, partial-|   agreeing children omitted
//! ```

pub mod convergence;
pub mod digest;
pub mod error;
pub mod packets;
pub mod protocol;
pub mod queue;
pub mod transport;

pub use convergence::{verify_convergence, ConvergenceResult};
pub use digest::{digest, representative};
pub use error::{Result, SyncError};
pub use packets::{PacketLayer, DEFAULT_FRAGMENT_SIZE, MAX_FRAGMENTS};
pub use protocol::Reconciler;
pub use queue::SyncQueue;
pub use transport::{
    memory::MemoryTransport, memory::MemoryTransportRegistry, PacketSender, Transport,
};
