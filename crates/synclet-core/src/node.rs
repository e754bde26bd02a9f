//! Protocol nodes and messages exchanged between replicas.

use std::collections::BTreeMap;

use crate::types::{Address, Atom, Hash, Id, Timestamp};

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Message type reserved for tree reconciliation. Other values are reserved.
pub const MESSAGE_TYPE_NODE: u32 = 0;

/// Opaque metadata threaded through send/receive hooks.
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Children of a [`ProtocolNode::SubNodes`] expansion.
pub type SubNodeMap = BTreeMap<Id, ProtocolNode>;

/// A node of the reconciliation protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolNode {
    /// Leaf only: the sender holds this timestamp, no payload attached.
    TimestampLeaf(Timestamp),

    /// Leaf only: full leaf state. `None` is a tombstone.
    TimestampAtomLeaf(Timestamp, Option<Atom>),

    /// Interior only: compact subtree summary.
    Digest(Hash),

    /// Interior only: one level of expansion.
    SubNodes {
        children: SubNodeMap,
        /// The map omits children already known to be in agreement.
        partial: bool,
    },
}

impl ProtocolNode {
    /// Whether this node may appear at a leaf address.
    pub fn is_leaf_node(&self) -> bool {
        matches!(
            self,
            ProtocolNode::TimestampLeaf(_) | ProtocolNode::TimestampAtomLeaf(..)
        )
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolNode::TimestampLeaf(_) => "timestamp",
            ProtocolNode::TimestampAtomLeaf(..) => "timestamp-atom",
            ProtocolNode::Digest(_) => "digest",
            ProtocolNode::SubNodes { .. } => "sub-nodes",
        }
    }
}

/// The atomic unit of the protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub version: u32,
    pub depth: usize,
    pub address: Address,
    pub node: ProtocolNode,
    pub context: Context,
}

impl Message {
    /// Create a message at the current protocol version.
    pub fn new(depth: usize, address: Address, node: ProtocolNode, context: Context) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            depth,
            address,
            node,
            context,
        }
    }
}
