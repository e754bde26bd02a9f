//! Strong type definitions for the synchronized tree.
//!
//! Addresses and timestamps are newtypes so that a segment list can never be
//! confused with a timestamp string at an API boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-bit subtree digest.
pub type Hash = u32;

/// Identifier of a single child below an interior address.
pub type Id = String;

/// Replica id used as the packet recipient to reach every peer on a transport.
pub const BROADCAST_ID: &str = "*";

/// Path from the tree root to a node.
///
/// The empty address is the root. Addresses shorter than the tree depth are
/// interior nodes, addresses of exactly the depth are leaves.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(Vec<Id>);

impl Address {
    /// The root address.
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Id>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[Id] {
        &self.0
    }

    /// The address of a direct child.
    pub fn child(&self, id: impl Into<Id>) -> Self {
        let mut segments = self.0.clone();
        segments.push(id.into());
        Self(segments)
    }

    /// Whether this address names a leaf in a tree of the given depth.
    pub fn is_leaf(&self, depth: usize) -> bool {
        self.0.len() == depth
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl<S: Into<Id>> FromIterator<S> for Address {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Write-time marker of a leaf.
///
/// Timestamps are totally ordered by plain lexicographic comparison. The
/// empty timestamp means the leaf was never written; it sorts before
/// everything else.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// The "never written" timestamp.
    pub const EMPTY: Self = Self(String::new());

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({:?})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Timestamp {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Timestamp {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A leaf payload.
///
/// Absence (a deleted or never-written leaf) is modelled as `Option<Atom>::None`
/// rather than as a variant, so a stored atom is always a real value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Atom {
    Bool(bool),
    Number(f64),
    String(String),
}

impl From<bool> for Atom {
    fn from(value: bool) -> Self {
        Atom::Bool(value)
    }
}

impl From<f64> for Atom {
    fn from(value: f64) -> Self {
        Atom::Number(value)
    }
}

impl From<i32> for Atom {
    fn from(value: i32) -> Self {
        Atom::Number(f64::from(value))
    }
}

impl From<&str> for Atom {
    fn from(value: &str) -> Self {
        Atom::String(value.to_owned())
    }
}

impl From<String> for Atom {
    fn from(value: String) -> Self {
        Atom::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_child_and_depth() {
        let root = Address::root();
        assert!(root.is_root());

        let leaf = root.child("t").child("r");
        assert_eq!(leaf.len(), 2);
        assert!(leaf.is_leaf(2));
        assert!(!leaf.is_leaf(3));
        assert_eq!(leaf.to_string(), "/t/r");
    }

    #[test]
    fn test_timestamp_ordering() {
        assert!(Timestamp::EMPTY < Timestamp::from("0001"));
        assert!(Timestamp::from("0001") < Timestamp::from("0002"));
        assert!(Timestamp::from("0002") < Timestamp::from("01"));
    }

    #[test]
    fn test_atom_json_shape() {
        assert_eq!(serde_json::to_string(&Atom::from("v")).unwrap(), "\"v\"");
        assert_eq!(serde_json::to_string(&Atom::from(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&Atom::from(2.5)).unwrap(), "2.5");

        let atom: Atom = serde_json::from_str("3").unwrap();
        assert_eq!(atom, Atom::Number(3.0));
    }
}
