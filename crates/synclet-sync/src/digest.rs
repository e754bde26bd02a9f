//! Subtree digests computed from live timestamps.
//!
//! Digests are never stored. `digest(address)` is a pure function of the
//! timestamps below `address`: each leaf child contributes the hash of its
//! timestamp, each interior child its own digest, XOR-combined.

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;

use synclet_core::{combine_hashes, hash_timestamp, Address, Hash, ProtocolNode};
use synclet_store::{ensure_interior, MetaConnector};

use crate::error::Result;

/// Digest of the interior node at `address`.
pub fn digest<'a, M>(meta: &'a M, address: &'a Address) -> BoxFuture<'a, Result<Hash>>
where
    M: MetaConnector + ?Sized,
{
    async move {
        let depth = meta.depth();
        ensure_interior(address, depth)?;

        let children: Vec<Address> = meta
            .read_child_ids(address)
            .await?
            .into_iter()
            .map(|id| address.child(id))
            .collect();

        let hashes = try_join_all(children.iter().map(|child| child_hash(meta, child))).await?;
        Ok(combine_hashes(hashes))
    }
    .boxed()
}

async fn child_hash<M>(meta: &M, child: &Address) -> Result<Hash>
where
    M: MetaConnector + ?Sized,
{
    if child.is_leaf(meta.depth()) {
        Ok(hash_timestamp(&meta.read_timestamp(child).await?))
    } else {
        digest(meta, child).await
    }
}

/// The compact node describing `address`: a digest for interior nodes, the
/// bare timestamp for leaves.
pub async fn representative<M>(meta: &M, address: &Address) -> Result<ProtocolNode>
where
    M: MetaConnector + ?Sized,
{
    if address.len() < meta.depth() {
        Ok(ProtocolNode::Digest(digest(meta, address).await?))
    } else {
        Ok(ProtocolNode::TimestampLeaf(meta.read_timestamp(address).await?))
    }
}
