//! Tree reconciliation.
//!
//! Given what a peer said about one address, decide whether the two
//! replicas already agree there and, if not, what to answer. Digests
//! disagreeing expand one level at a time, so the work per round is bounded
//! by the actual divergence rather than by the size of the tree.
//!
//! ## Leaf rules (last writer wins)
//!
//! ```text
//! peer says               peer newer               peer older
//! TimestampLeaf(t)        reply TimestampLeaf(mine) reply TimestampAtomLeaf(mine)
//! TimestampAtomLeaf(t,a)  apply a and t            reply TimestampAtomLeaf(mine)
//! ```
//!
//! Equal timestamps never produce a reply.

use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use tracing::{trace, warn};

use synclet_core::{Address, Atom, ProtocolNode, SubNodeMap, Timestamp};
use synclet_store::{DataConnector, MetaConnector};

use crate::digest::{digest, representative};
use crate::error::Result;

/// Reconciles inbound protocol nodes against one replica's connectors.
pub struct Reconciler<D, M> {
    data: Arc<D>,
    meta: Arc<M>,
    depth: usize,
}

impl<D: DataConnector, M: MetaConnector> Reconciler<D, M> {
    /// Create a reconciler. The depth is taken from the meta connector.
    pub fn new(data: Arc<D>, meta: Arc<M>) -> Self {
        let depth = meta.depth();
        Self { data, meta, depth }
    }

    /// Depth of the reconciled tree.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The data connector.
    pub fn data(&self) -> &Arc<D> {
        &self.data
    }

    /// The meta connector.
    pub fn meta(&self) -> &Arc<M> {
        &self.meta
    }

    fn is_leaf(&self, address: &Address) -> bool {
        address.len() == self.depth
    }

    /// Digest or timestamp describing `address`.
    pub async fn representative(&self, address: &Address) -> Result<ProtocolNode> {
        representative(self.meta.as_ref(), address).await
    }

    /// Full state below `address`: the leaf with its atom, or every
    /// descendant expanded.
    pub fn read_full<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, Result<ProtocolNode>> {
        async move {
            if self.is_leaf(address) {
                let (timestamp, atom) = self.read_leaf(address).await?;
                return Ok(ProtocolNode::TimestampAtomLeaf(timestamp, atom));
            }

            let ids = self.meta.read_child_ids(address).await?;
            let children: Vec<Address> = ids.iter().map(|id| address.child(id.clone())).collect();
            let nodes = try_join_all(children.iter().map(|child| self.read_full(child))).await?;

            Ok(ProtocolNode::SubNodes {
                children: ids.into_iter().zip(nodes).collect(),
                partial: false,
            })
        }
        .boxed()
    }

    /// Process a node a peer sent about `address`.
    ///
    /// Returns the node to send back to that peer, or `None` when the
    /// replicas agree (or the node was invalid and has been dropped).
    pub fn transform_node<'a>(
        &'a self,
        address: &'a Address,
        node: ProtocolNode,
    ) -> BoxFuture<'a, Result<Option<ProtocolNode>>> {
        async move {
            if node.is_leaf_node() != self.is_leaf(address) {
                warn!(
                    address = %address,
                    depth = self.depth,
                    kind = node.kind(),
                    "invalid node for address, dropping"
                );
                return Ok(None);
            }

            match node {
                ProtocolNode::TimestampLeaf(other) => self.transform_timestamp(address, other).await,
                ProtocolNode::TimestampAtomLeaf(other, atom) => {
                    self.transform_timestamp_atom(address, other, atom).await
                }
                ProtocolNode::Digest(other) => {
                    let mine = digest(self.meta.as_ref(), address).await?;
                    if mine == other {
                        return Ok(None);
                    }
                    trace!(address = %address, mine, other, "digests differ, expanding");
                    self.expand(address).await.map(Some)
                }
                ProtocolNode::SubNodes { children, partial } => {
                    self.transform_sub_nodes(address, children, partial).await
                }
            }
        }
        .boxed()
    }

    async fn transform_timestamp(
        &self,
        address: &Address,
        other: Timestamp,
    ) -> Result<Option<ProtocolNode>> {
        let mine = self.meta.read_timestamp(address).await?;
        Ok(match other.cmp(&mine) {
            // Peer is newer: tell it how stale we are so it pushes the atom.
            std::cmp::Ordering::Greater => Some(ProtocolNode::TimestampLeaf(mine)),
            std::cmp::Ordering::Less => {
                let atom = self.data.read_atom(address).await?;
                Some(ProtocolNode::TimestampAtomLeaf(mine, atom))
            }
            std::cmp::Ordering::Equal => None,
        })
    }

    async fn transform_timestamp_atom(
        &self,
        address: &Address,
        other: Timestamp,
        atom: Option<Atom>,
    ) -> Result<Option<ProtocolNode>> {
        let mine = self.meta.read_timestamp(address).await?;
        Ok(match other.cmp(&mine) {
            std::cmp::Ordering::Greater => {
                self.apply_leaf(address, other, atom).await?;
                None
            }
            std::cmp::Ordering::Less => {
                let my_atom = self.data.read_atom(address).await?;
                Some(ProtocolNode::TimestampAtomLeaf(mine, my_atom))
            }
            std::cmp::Ordering::Equal => None,
        })
    }

    /// One level of expansion: every known child's representative.
    async fn expand(&self, address: &Address) -> Result<ProtocolNode> {
        let ids = self.meta.read_child_ids(address).await?;
        let children: Vec<Address> = ids.iter().map(|id| address.child(id.clone())).collect();
        let nodes =
            try_join_all(children.iter().map(|child| self.representative(child))).await?;

        Ok(ProtocolNode::SubNodes {
            children: ids.into_iter().zip(nodes).collect(),
            partial: false,
        })
    }

    async fn transform_sub_nodes(
        &self,
        address: &Address,
        other_children: SubNodeMap,
        other_partial: bool,
    ) -> Result<Option<ProtocolNode>> {
        let mut response = SubNodeMap::new();
        // A partial request says nothing about children it left out, so the
        // answer cannot be a complete enumeration either.
        let mut partial = other_partial;

        if !other_partial {
            // Offer everything the peer did not mention.
            let local_only: Vec<String> = self
                .meta
                .read_child_ids(address)
                .await?
                .into_iter()
                .filter(|id| !other_children.contains_key(id))
                .collect();
            let addresses: Vec<Address> =
                local_only.iter().map(|id| address.child(id.clone())).collect();
            let nodes = try_join_all(addresses.iter().map(|child| self.read_full(child))).await?;
            response.extend(local_only.into_iter().zip(nodes));
        }

        let (ids, nodes): (Vec<String>, Vec<ProtocolNode>) = other_children.into_iter().unzip();
        let addresses: Vec<Address> = ids.iter().map(|id| address.child(id.clone())).collect();
        let replies = try_join_all(
            addresses
                .iter()
                .zip(nodes)
                .map(|(child, node)| self.transform_node(child, node)),
        )
        .await?;

        for (id, reply) in ids.into_iter().zip(replies) {
            match reply {
                Some(node) => {
                    response.insert(id, node);
                }
                // Already in agreement, omitted from the answer.
                None => partial = true,
            }
        }

        if response.is_empty() {
            Ok(None)
        } else {
            Ok(Some(ProtocolNode::SubNodes {
                children: response,
                partial,
            }))
        }
    }

    async fn read_leaf(&self, address: &Address) -> Result<(Timestamp, Option<Atom>)> {
        let timestamp = self.meta.read_timestamp(address).await?;
        let atom = self.data.read_atom(address).await?;
        Ok((timestamp, atom))
    }

    /// Store a newer leaf state. The timestamp is written even for a
    /// deletion so the tombstone keeps ordering later writes.
    pub async fn apply_leaf(
        &self,
        address: &Address,
        timestamp: Timestamp,
        atom: Option<Atom>,
    ) -> Result<()> {
        match atom {
            Some(atom) => self.data.write_atom(address, atom).await?,
            None => self.data.remove_atom(address).await?,
        }
        self.meta.write_timestamp(address, timestamp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synclet_core::hash_timestamp;
    use synclet_store::{MemoryDataConnector, MemoryMetaConnector};

    type MemoryReconciler = Reconciler<MemoryDataConnector, MemoryMetaConnector>;

    fn reconciler(depth: usize) -> MemoryReconciler {
        Reconciler::new(
            Arc::new(MemoryDataConnector::new(depth)),
            Arc::new(MemoryMetaConnector::new(depth)),
        )
    }

    fn addr(segments: &[&str]) -> Address {
        Address::new(segments.iter().copied())
    }

    async fn seed(r: &MemoryReconciler, segments: &[&str], ts: &str, atom: &str) {
        r.apply_leaf(&addr(segments), ts.into(), Some(atom.into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_newer_timestamp_requests_payload() {
        let r = reconciler(1);
        seed(&r, &["k"], "0001", "old").await;

        let reply = r
            .transform_node(&addr(&["k"]), ProtocolNode::TimestampLeaf("0002".into()))
            .await
            .unwrap();
        assert_eq!(reply, Some(ProtocolNode::TimestampLeaf("0001".into())));
    }

    #[tokio::test]
    async fn test_older_timestamp_gets_payload_pushed() {
        let r = reconciler(1);
        seed(&r, &["k"], "0002", "new").await;

        let reply = r
            .transform_node(&addr(&["k"]), ProtocolNode::TimestampLeaf("0001".into()))
            .await
            .unwrap();
        assert_eq!(
            reply,
            Some(ProtocolNode::TimestampAtomLeaf("0002".into(), Some("new".into())))
        );
    }

    #[tokio::test]
    async fn test_newer_atom_applied_and_replay_is_idempotent() {
        let r = reconciler(1);
        let k = addr(&["k"]);
        let node = ProtocolNode::TimestampAtomLeaf("0003".into(), Some("v".into()));

        assert_eq!(r.transform_node(&k, node.clone()).await.unwrap(), None);
        assert_eq!(r.data.read_atom(&k).await.unwrap(), Some(Atom::from("v")));
        assert_eq!(r.meta.read_timestamp(&k).await.unwrap(), Timestamp::from("0003"));

        let mut changes = r.data.subscribe();
        assert_eq!(r.transform_node(&k, node).await.unwrap(), None);
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tombstone_retains_timestamp() {
        let r = reconciler(1);
        let k = addr(&["k"]);
        seed(&r, &["k"], "0001", "v").await;

        let reply = r
            .transform_node(&k, ProtocolNode::TimestampAtomLeaf("0005".into(), None))
            .await
            .unwrap();
        assert_eq!(reply, None);
        assert_eq!(r.data.read_atom(&k).await.unwrap(), None);
        assert_eq!(r.meta.read_timestamp(&k).await.unwrap(), Timestamp::from("0005"));

        // A stale write cannot resurrect the atom; the tombstone is pushed back.
        let reply = r
            .transform_node(&k, ProtocolNode::TimestampAtomLeaf("0004".into(), Some("v".into())))
            .await
            .unwrap();
        assert_eq!(
            reply,
            Some(ProtocolNode::TimestampAtomLeaf("0005".into(), None))
        );
        assert_eq!(r.data.read_atom(&k).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_digest_mismatch_expands_one_level() {
        let r = reconciler(2);
        seed(&r, &["a", "x"], "1", "v").await;
        seed(&r, &["b", "y"], "2", "w").await;

        let reply = r
            .transform_node(&Address::root(), ProtocolNode::Digest(0))
            .await
            .unwrap()
            .unwrap();

        let ProtocolNode::SubNodes { children, partial } = reply else {
            panic!("expected sub nodes");
        };
        assert!(!partial);
        assert_eq!(children["a"], ProtocolNode::Digest(hash_timestamp(&"1".into())));
        assert_eq!(children["b"], ProtocolNode::Digest(hash_timestamp(&"2".into())));
    }

    #[tokio::test]
    async fn test_matching_digest_needs_no_reply() {
        let r = reconciler(1);
        seed(&r, &["k"], "0001", "v").await;
        let mine = hash_timestamp(&"0001".into());

        let reply = r
            .transform_node(&Address::root(), ProtocolNode::Digest(mine))
            .await
            .unwrap();
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn test_complete_sub_nodes_offer_local_only_children() {
        let r = reconciler(1);
        seed(&r, &["k"], "0001", "v1").await;

        let reply = r
            .transform_node(
                &Address::root(),
                ProtocolNode::SubNodes {
                    children: SubNodeMap::new(),
                    partial: false,
                },
            )
            .await
            .unwrap();

        let mut expected = SubNodeMap::new();
        expected.insert(
            "k".into(),
            ProtocolNode::TimestampAtomLeaf("0001".into(), Some("v1".into())),
        );
        assert_eq!(
            reply,
            Some(ProtocolNode::SubNodes {
                children: expected,
                partial: false,
            })
        );
    }

    #[tokio::test]
    async fn test_partial_sub_nodes_do_not_offer_unmentioned_children() {
        let r = reconciler(1);
        seed(&r, &["k"], "0001", "v1").await;

        let reply = r
            .transform_node(
                &Address::root(),
                ProtocolNode::SubNodes {
                    children: SubNodeMap::new(),
                    partial: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn test_agreeing_children_mark_reply_partial() {
        let r = reconciler(1);
        seed(&r, &["same"], "0001", "v").await;
        seed(&r, &["older"], "0002", "mine").await;

        let mut children = SubNodeMap::new();
        children.insert("same".into(), ProtocolNode::TimestampLeaf("0001".into()));
        children.insert("older".into(), ProtocolNode::TimestampLeaf("0001".into()));

        let reply = r
            .transform_node(
                &Address::root(),
                ProtocolNode::SubNodes {
                    children,
                    partial: false,
                },
            )
            .await
            .unwrap()
            .unwrap();

        let ProtocolNode::SubNodes { children, partial } = reply else {
            panic!("expected sub nodes");
        };
        assert!(partial);
        assert_eq!(children.len(), 1);
        assert_eq!(
            children["older"],
            ProtocolNode::TimestampAtomLeaf("0002".into(), Some("mine".into()))
        );
    }

    #[tokio::test]
    async fn test_invalid_node_shapes_dropped() {
        let r = reconciler(2);
        let interior = addr(&["a"]);
        let leaf = addr(&["a", "x"]);

        assert_eq!(
            r.transform_node(&interior, ProtocolNode::TimestampLeaf("1".into()))
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            r.transform_node(&leaf, ProtocolNode::Digest(1)).await.unwrap(),
            None
        );
        assert!(r.meta.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_read_full_expands_every_level() {
        let r = reconciler(2);
        seed(&r, &["a", "x"], "1", "v").await;

        let full = r.read_full(&Address::root()).await.unwrap();
        let ProtocolNode::SubNodes { children, partial } = full else {
            panic!("expected sub nodes");
        };
        assert!(!partial);
        let ProtocolNode::SubNodes { children: inner, .. } = &children["a"] else {
            panic!("expected nested sub nodes");
        };
        assert_eq!(
            inner["x"],
            ProtocolNode::TimestampAtomLeaf("1".into(), Some("v".into()))
        );
    }
}
