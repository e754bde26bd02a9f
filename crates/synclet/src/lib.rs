//! # Synclet
//!
//! Keep a fixed-depth tree of values identical across replicas.
//!
//! ## Overview
//!
//! Each replica stores its tree through two connectors: a data connector
//! holding leaf atoms and a meta connector holding the timestamp of every
//! leaf. Replicas exchange compact summaries over one or more transports:
//!
//! - **Digests**: an interior node is summarized by the XOR of its
//!   children's hashes, so agreeing subtrees cost one number to confirm.
//! - **Expansion**: when digests differ, the subtree is opened one level.
//! - **Last writer wins**: leaves are compared by timestamp; the newer side
//!   pushes its atom, and deletions keep their timestamp as a tombstone.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use synclet::core::Address;
//! use synclet::store::{MemoryDataConnector, MemoryMetaConnector};
//! use synclet::sync::MemoryTransportRegistry;
//! use synclet::{SyncletBuilder, SyncletConfig};
//!
//! async fn example() -> synclet::Result<()> {
//!     let registry = MemoryTransportRegistry::new();
//!
//!     let synclet = SyncletBuilder::new(
//!         Arc::new(MemoryDataConnector::new(1)),
//!         Arc::new(MemoryMetaConnector::new(1)),
//!     )
//!     .transport(Arc::new(registry.create_transport("pets")))
//!     .config(SyncletConfig::default().with_id("alice"))
//!     .build()?;
//!
//!     synclet.start().await?;
//!     synclet.set_atom(&Address::new(["fido"]), "dog").await?;
//!     synclet.stop().await
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `synclet::core` - Data model, protocol nodes, wire codec, clock
//! - `synclet::store` - Connector traits and in-memory connectors
//! - `synclet::sync` - Packets, queue, transports, reconciliation

pub mod config;
pub mod error;
pub mod synclet;

// Re-export component crates
pub use synclet_core as core;
pub use synclet_store as store;
pub use synclet_sync as sync;

// Re-export main types for convenience
pub use config::{SyncletConfig, SyncletHooks};
pub use error::{Result, SyncletError};
pub use synclet::{Synclet, SyncletBuilder};

// Re-export commonly used types
pub use synclet_core::{Address, Atom, Context, Hash, Message, ProtocolNode, Timestamp};
pub use synclet_store::{DataConnector, MetaConnector};
pub use synclet_sync::Transport;
