//! # Synclet Core
//!
//! Pure primitives for Synclet: the fixed-depth tree data model, protocol
//! nodes and their JSON wire form.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Address`] - Path of string ids from the root to a node
//! - [`Atom`] - Leaf payload (absence is a tombstone)
//! - [`Timestamp`] - Lexicographically ordered write marker
//! - [`ProtocolNode`] - What replicas exchange about one address
//! - [`Message`] - The atomic protocol unit
//!
//! ## Digests
//!
//! Interior nodes are summarized by XOR-combining their children's hashes.
//! See the [`hash`] module.

pub mod binding;
pub mod clock;
pub mod codec;
pub mod error;
pub mod hash;
pub mod node;
pub mod types;

pub use binding::Binding;
pub use clock::HlcClock;
pub use codec::{decode_message, decode_node, encode_message, encode_node};
pub use error::{CoreError, Result};
pub use hash::{combine_hashes, hash_timestamp, replace_child_hash};
pub use node::{Context, Message, ProtocolNode, SubNodeMap, MESSAGE_TYPE_NODE, PROTOCOL_VERSION};
pub use types::{Address, Atom, Hash, Id, Timestamp, BROADCAST_ID};
