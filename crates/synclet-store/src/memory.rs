//! In-memory reference connectors.
//!
//! These are the behavioral oracle for every other adapter: run the same
//! scenario through both and diff the final snapshots. Everything is lost
//! when the connector is dropped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use synclet_core::{Address, Atom, Binding, Id, Timestamp};

use crate::error::Result;
use crate::traits::{ensure_interior, ensure_leaf, ensure_within, DataConnector, MetaConnector};

/// Capacity of the change stream. Slow subscribers observe `Lagged`.
const CHANGE_CAPACITY: usize = 1024;

/// A mutation applied to an in-memory connector.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeChange {
    /// An atom was written (`Some`) or removed (`None`).
    Atom { address: Address, atom: Option<Atom> },
    /// A timestamp was written.
    Timestamp { address: Address, timestamp: Timestamp },
}

/// Nested mapping keyed by address segment.
struct TreeNode<T> {
    value: Option<T>,
    children: BTreeMap<Id, TreeNode<T>>,
}

impl<T> Default for TreeNode<T> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

impl<T: Clone> TreeNode<T> {
    fn get(&self, segments: &[Id]) -> Option<&TreeNode<T>> {
        match segments.split_first() {
            None => Some(self),
            Some((id, rest)) => self.children.get(id)?.get(rest),
        }
    }

    fn set(&mut self, segments: &[Id], value: T) {
        match segments.split_first() {
            None => self.value = Some(value),
            Some((id, rest)) => self.children.entry(id.clone()).or_default().set(rest, value),
        }
    }

    /// Clear the value at `segments`, pruning branches left empty.
    fn remove(&mut self, segments: &[Id]) {
        match segments.split_first() {
            None => self.value = None,
            Some((id, rest)) => {
                if let Some(child) = self.children.get_mut(id) {
                    child.remove(rest);
                    if child.is_empty() {
                        self.children.remove(id);
                    }
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    fn collect(&self, prefix: &Address, out: &mut BTreeMap<Address, T>) {
        if let Some(value) = &self.value {
            out.insert(prefix.clone(), value.clone());
        }
        for (id, child) in &self.children {
            child.collect(&prefix.child(id.clone()), out);
        }
    }
}

/// Lock-guarded tree shared by both connector kinds.
struct MemoryTree<T> {
    root: RwLock<TreeNode<T>>,
}

impl<T: Clone> MemoryTree<T> {
    fn new() -> Self {
        Self {
            root: RwLock::new(TreeNode::default()),
        }
    }

    fn get(&self, address: &Address) -> Option<T> {
        let root = self.root.read().unwrap_or_else(PoisonError::into_inner);
        root.get(address.segments()).and_then(|node| node.value.clone())
    }

    fn set(&self, address: &Address, value: T) {
        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        root.set(address.segments(), value);
    }

    fn remove(&self, address: &Address) {
        let mut root = self.root.write().unwrap_or_else(PoisonError::into_inner);
        root.remove(address.segments());
    }

    fn child_ids(&self, address: &Address) -> Vec<Id> {
        let root = self.root.read().unwrap_or_else(PoisonError::into_inner);
        root.get(address.segments())
            .map(|node| node.children.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn snapshot(&self) -> BTreeMap<Address, T> {
        let root = self.root.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = BTreeMap::new();
        root.collect(&Address::root(), &mut out);
        out
    }
}

/// In-memory data connector.
pub struct MemoryDataConnector {
    depth: usize,
    tree: MemoryTree<Atom>,
    connected: AtomicBool,
    binding: Binding,
    changes: broadcast::Sender<TreeChange>,
}

impl MemoryDataConnector {
    /// Create an empty connector for a tree of the given depth.
    pub fn new(depth: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            depth,
            tree: MemoryTree::new(),
            connected: AtomicBool::new(false),
            binding: Binding::new(),
            changes,
        }
    }

    /// Every stored atom, keyed by leaf address.
    pub fn snapshot(&self) -> BTreeMap<Address, Atom> {
        self.tree.snapshot()
    }

    /// Observe every mutation applied from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeChange> {
        self.changes.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn notify(&self, change: TreeChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }
}

#[async_trait]
impl DataConnector for MemoryDataConnector {
    fn depth(&self) -> usize {
        self.depth
    }

    fn binding(&self) -> &Binding {
        &self.binding
    }

    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::Release);
        debug!(owner = ?self.binding.owner(), "memory data connector connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::Release);
        debug!(owner = ?self.binding.owner(), "memory data connector disconnected");
        Ok(())
    }

    async fn read_atom(&self, address: &Address) -> Result<Option<Atom>> {
        ensure_leaf(address, self.depth)?;
        Ok(self.tree.get(address))
    }

    async fn write_atom(&self, address: &Address, atom: Atom) -> Result<()> {
        ensure_leaf(address, self.depth)?;
        self.tree.set(address, atom.clone());
        self.notify(TreeChange::Atom {
            address: address.clone(),
            atom: Some(atom),
        });
        Ok(())
    }

    async fn remove_atom(&self, address: &Address) -> Result<()> {
        ensure_leaf(address, self.depth)?;
        self.tree.remove(address);
        self.notify(TreeChange::Atom {
            address: address.clone(),
            atom: None,
        });
        Ok(())
    }

    async fn read_child_ids(&self, address: &Address) -> Result<Vec<Id>> {
        ensure_interior(address, self.depth)?;
        Ok(self.tree.child_ids(address))
    }
}

/// In-memory meta connector.
pub struct MemoryMetaConnector {
    depth: usize,
    tree: MemoryTree<Timestamp>,
    connected: AtomicBool,
    binding: Binding,
    changes: broadcast::Sender<TreeChange>,
}

impl MemoryMetaConnector {
    /// Create an empty connector for a tree of the given depth.
    pub fn new(depth: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            depth,
            tree: MemoryTree::new(),
            connected: AtomicBool::new(false),
            binding: Binding::new(),
            changes,
        }
    }

    /// Every stored timestamp, tombstones included.
    pub fn snapshot(&self) -> BTreeMap<Address, Timestamp> {
        self.tree.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeChange> {
        self.changes.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[async_trait]
impl MetaConnector for MemoryMetaConnector {
    fn depth(&self) -> usize {
        self.depth
    }

    fn binding(&self) -> &Binding {
        &self.binding
    }

    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::Release);
        debug!(owner = ?self.binding.owner(), "memory meta connector connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::Release);
        debug!(owner = ?self.binding.owner(), "memory meta connector disconnected");
        Ok(())
    }

    async fn read_timestamp(&self, address: &Address) -> Result<Timestamp> {
        ensure_within(address, self.depth)?;
        Ok(self.tree.get(address).unwrap_or_default())
    }

    async fn write_timestamp(&self, address: &Address, timestamp: Timestamp) -> Result<()> {
        ensure_within(address, self.depth)?;
        self.tree.set(address, timestamp.clone());
        let _ = self.changes.send(TreeChange::Timestamp {
            address: address.clone(),
            timestamp,
        });
        Ok(())
    }

    async fn read_child_ids(&self, address: &Address) -> Result<Vec<Id>> {
        ensure_interior(address, self.depth)?;
        Ok(self.tree.child_ids(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn addr(segments: &[&str]) -> Address {
        Address::new(segments.iter().copied())
    }

    #[tokio::test]
    async fn test_data_write_read_remove() {
        let data = MemoryDataConnector::new(2);
        let leaf = addr(&["t", "r"]);

        data.write_atom(&leaf, Atom::from("v")).await.unwrap();
        assert_eq!(data.read_atom(&leaf).await.unwrap(), Some(Atom::from("v")));
        assert_eq!(data.read_child_ids(&Address::root()).await.unwrap(), vec!["t"]);

        data.remove_atom(&leaf).await.unwrap();
        assert_eq!(data.read_atom(&leaf).await.unwrap(), None);
        // Empty branches are pruned.
        assert!(data.read_child_ids(&Address::root()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_data_rejects_interior_writes() {
        let data = MemoryDataConnector::new(2);
        let err = data.write_atom(&addr(&["t"]), Atom::from(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidAddress { depth: 2, .. }));
        assert!(data.read_child_ids(&addr(&["t", "r"])).await.is_err());
    }

    #[tokio::test]
    async fn test_meta_defaults_to_empty_timestamp() {
        let meta = MemoryMetaConnector::new(1);
        let ts = meta.read_timestamp(&addr(&["k"])).await.unwrap();
        assert!(ts.is_empty());
    }

    #[tokio::test]
    async fn test_meta_children_sorted() {
        let meta = MemoryMetaConnector::new(1);
        for id in ["b", "a", "c"] {
            meta.write_timestamp(&addr(&[id]), Timestamp::from("0001"))
                .await
                .unwrap();
        }
        assert_eq!(
            meta.read_child_ids(&Address::root()).await.unwrap(),
            vec!["a", "b", "c"]
        );
        assert_eq!(meta.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn test_changes_are_observed() {
        let data = MemoryDataConnector::new(1);
        let mut changes = data.subscribe();
        let leaf = addr(&["k"]);

        data.write_atom(&leaf, Atom::from(true)).await.unwrap();
        data.remove_atom(&leaf).await.unwrap();

        assert_eq!(
            changes.recv().await.unwrap(),
            TreeChange::Atom {
                address: leaf.clone(),
                atom: Some(Atom::from(true)),
            }
        );
        assert_eq!(
            changes.recv().await.unwrap(),
            TreeChange::Atom {
                address: leaf,
                atom: None,
            }
        );
    }

    proptest::proptest! {
        #[test]
        fn snapshot_matches_model(
            ops in proptest::collection::vec(
                (("[ab]", "[xyz]"), proptest::option::of(0i32..100)),
                0..32,
            )
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let data = MemoryDataConnector::new(2);
            let mut model = BTreeMap::new();

            runtime.block_on(async {
                for ((table, row), value) in &ops {
                    let leaf = addr(&[table.as_str(), row.as_str()]);
                    match value {
                        Some(n) => {
                            data.write_atom(&leaf, Atom::from(*n)).await.unwrap();
                            model.insert(leaf, Atom::from(*n));
                        }
                        None => {
                            data.remove_atom(&leaf).await.unwrap();
                            model.remove(&leaf);
                        }
                    }
                }
            });

            proptest::prop_assert_eq!(data.snapshot(), model);
        }
    }

    #[tokio::test]
    async fn test_connect_toggles_state() {
        let meta = MemoryMetaConnector::new(1);
        assert!(!meta.is_connected());
        meta.connect().await.unwrap();
        assert!(meta.is_connected());
        meta.disconnect().await.unwrap();
        assert!(!meta.is_connected());
    }
}
