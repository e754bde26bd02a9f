//! Connector traits: the abstract interface between a synclet and storage.
//!
//! A synclet reads and writes its tree through two independently connected
//! stores. The data side owns leaf atoms, the meta side owns timestamps. The
//! two are never assumed to be transactionally coupled: the synclet
//! sequences every cross-store update explicitly.

use async_trait::async_trait;
use synclet_core::{Address, Atom, Binding, Id, Timestamp};

use crate::error::{Result, StoreError};

/// Storage of leaf atoms.
///
/// # Design Notes
///
/// - **Fixed depth**: every leaf address has exactly [`depth`](Self::depth)
///   segments. Implementations reject other lengths with
///   [`StoreError::InvalidAddress`].
/// - **Single owner**: a connector is bound to one synclet through its
///   [`Binding`].
#[async_trait]
pub trait DataConnector: Send + Sync + 'static {
    /// Depth of the tree this connector stores.
    fn depth(&self) -> usize;

    /// Ownership slot checked when the connector is attached to a synclet.
    fn binding(&self) -> &Binding;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Read the atom at a leaf. `None` if absent or deleted.
    async fn read_atom(&self, address: &Address) -> Result<Option<Atom>>;

    async fn write_atom(&self, address: &Address, atom: Atom) -> Result<()>;

    async fn remove_atom(&self, address: &Address) -> Result<()>;

    /// Ids of the children present below an interior address.
    async fn read_child_ids(&self, address: &Address) -> Result<Vec<Id>>;
}

/// Storage of timestamps.
///
/// Timestamps outlive their atoms: a deleted leaf keeps its timestamp as a
/// tombstone so later writes can be ordered against the deletion.
#[async_trait]
pub trait MetaConnector: Send + Sync + 'static {
    /// Depth of the tree this connector stores.
    fn depth(&self) -> usize;

    /// Ownership slot checked when the connector is attached to a synclet.
    fn binding(&self) -> &Binding;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Read the timestamp at an address. [`Timestamp::EMPTY`] if never written.
    async fn read_timestamp(&self, address: &Address) -> Result<Timestamp>;

    async fn write_timestamp(&self, address: &Address, timestamp: Timestamp) -> Result<()>;

    /// Ids of the children present below an interior address.
    async fn read_child_ids(&self, address: &Address) -> Result<Vec<Id>>;
}

/// Fail unless `address` names a leaf.
pub fn ensure_leaf(address: &Address, depth: usize) -> Result<()> {
    if address.is_leaf(depth) {
        Ok(())
    } else {
        Err(StoreError::InvalidAddress {
            address: address.to_string(),
            depth,
            reason: "expected a leaf address",
        })
    }
}

/// Fail unless `address` names an interior node.
pub fn ensure_interior(address: &Address, depth: usize) -> Result<()> {
    if address.len() < depth {
        Ok(())
    } else {
        Err(StoreError::InvalidAddress {
            address: address.to_string(),
            depth,
            reason: "expected an interior address",
        })
    }
}

/// Fail unless `address` fits within the tree at all.
pub fn ensure_within(address: &Address, depth: usize) -> Result<()> {
    if address.len() <= depth {
        Ok(())
    } else {
        Err(StoreError::InvalidAddress {
            address: address.to_string(),
            depth,
            reason: "address is deeper than the tree",
        })
    }
}
