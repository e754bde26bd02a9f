//! # Synclet Store
//!
//! Connector contracts for Synclet. A synclet never touches storage
//! directly; it reads and writes its tree through a [`DataConnector`]
//! (leaf atoms) and a [`MetaConnector`] (timestamps, tombstones included).
//!
//! ## Key Types
//!
//! - [`DataConnector`] / [`MetaConnector`] - The async traits adapters implement
//! - [`MemoryDataConnector`] / [`MemoryMetaConnector`] - In-memory reference
//!   connectors, used by tests and as the oracle for other adapters
//! - [`TreeChange`] - Mutation notifications from the in-memory connectors
//!
//! ## Usage
//!
//! ```rust
//! use synclet_core::{Address, Atom, Timestamp};
//! use synclet_store::{DataConnector, MemoryDataConnector, MemoryMetaConnector, MetaConnector};
//!
//! # async fn example() -> synclet_store::Result<()> {
//! let data = MemoryDataConnector::new(1);
//! let meta = MemoryMetaConnector::new(1);
//!
//! let leaf = Address::new(["k"]);
//! meta.write_timestamp(&leaf, Timestamp::from("0001")).await?;
//! data.write_atom(&leaf, Atom::from("v1")).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{MemoryDataConnector, MemoryMetaConnector, TreeChange};
pub use traits::{ensure_interior, ensure_leaf, ensure_within, DataConnector, MetaConnector};
