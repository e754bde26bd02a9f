//! Digest hashing.
//!
//! A subtree digest is the XOR of its children's hashes. XOR is commutative
//! and self-inverse, so child order never matters and one child's
//! contribution can be swapped out without rehashing its siblings.

use crate::types::{Hash, Timestamp};

/// Stable string-to-u32 hash of a leaf timestamp.
///
/// Uses the first four bytes of the Blake3 hash, little-endian.
pub fn hash_timestamp(timestamp: &Timestamp) -> Hash {
    let digest = blake3::hash(timestamp.as_str().as_bytes());
    let bytes = digest.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Combine child hashes into a parent digest.
pub fn combine_hashes<I>(hashes: I) -> Hash
where
    I: IntoIterator<Item = Hash>,
{
    hashes.into_iter().fold(0, |acc, hash| acc ^ hash)
}

/// Recompute a parent digest after one child's hash changed.
pub fn replace_child_hash(parent: Hash, old_child: Hash, new_child: Hash) -> Hash {
    parent ^ old_child ^ new_child
}
