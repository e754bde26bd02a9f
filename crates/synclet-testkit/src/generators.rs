//! Proptest generators for property-based testing.

use proptest::prelude::*;

use synclet_core::{Address, Atom, Context, Hash, Message, ProtocolNode, Timestamp};

/// Generate an address segment.
pub fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,3}".prop_map(String::from)
}

/// Generate a leaf address for a tree of the given depth.
pub fn leaf_address(depth: usize) -> impl Strategy<Value = Address> {
    prop::collection::vec(segment(), depth).prop_map(Address::new)
}

/// Generate a four digit timestamp. Never empty.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    "[0-9]{4}".prop_map(Timestamp::new)
}

/// Generate an atom. Numbers are integral so they survive a JSON round trip
/// exactly.
pub fn atom() -> impl Strategy<Value = Atom> {
    prop_oneof![
        any::<bool>().prop_map(Atom::Bool),
        (-1_000_000i32..1_000_000).prop_map(|n| Atom::Number(f64::from(n))),
        "[a-z0-9 ]{0,12}".prop_map(Atom::String),
    ]
}

/// Generate a leaf state; `None` is a tombstone.
pub fn leaf_state() -> impl Strategy<Value = Option<Atom>> {
    prop::option::weighted(0.8, atom())
}

/// A single leaf write.
#[derive(Debug, Clone)]
pub struct LeafWrite {
    pub address: Address,
    pub timestamp: Timestamp,
    pub atom: Option<Atom>,
}

/// Generate up to `max` leaf writes into a tree of the given depth.
pub fn leaf_writes(depth: usize, max: usize) -> impl Strategy<Value = Vec<LeafWrite>> {
    prop::collection::vec(
        (leaf_address(depth), timestamp(), leaf_state()).prop_map(|(address, timestamp, atom)| {
            LeafWrite {
                address,
                timestamp,
                atom,
            }
        }),
        0..=max,
    )
}

/// Generate a protocol node. Leaf variants, digests and nested sub-nodes
/// are mixed freely; shape validity against an address is not enforced.
pub fn protocol_node() -> impl Strategy<Value = ProtocolNode> {
    let leaf = prop_oneof![
        timestamp().prop_map(ProtocolNode::TimestampLeaf),
        (timestamp(), leaf_state()).prop_map(|(ts, atom)| ProtocolNode::TimestampAtomLeaf(ts, atom)),
        any::<Hash>().prop_map(ProtocolNode::Digest),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        (prop::collection::btree_map(segment(), inner, 0..4), any::<bool>())
            .prop_map(|(children, partial)| ProtocolNode::SubNodes { children, partial })
    })
}

/// Generate a message context with a few scalar entries.
pub fn context() -> impl Strategy<Value = Context> {
    prop::collection::btree_map("[a-z]{1,6}", any::<u32>(), 0..3).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(key, value)| (key, serde_json::Value::from(value)))
            .collect()
    })
}

/// Generate a message for a tree of the given depth.
pub fn message(depth: usize) -> impl Strategy<Value = Message> {
    (
        prop::collection::vec(segment(), 0..=depth),
        protocol_node(),
        context(),
    )
        .prop_map(move |(segments, node, context)| {
            Message::new(depth, Address::new(segments), node, context)
        })
}
