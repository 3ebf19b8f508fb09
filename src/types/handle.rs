//! Shared node handles
//!
//! The authoring layer owns nodes through `NodeHandle`s. A group keeps only a
//! weak reference, so dropping the last handle destroys the node and the group
//! prunes it on its next tick. Edits go through [`NodeHandle::edit`], which
//! raises the dirty flags the group polls.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, Weak};

use glam::Mat4;

use super::FieldNode;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a node, unique per process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Raw id value
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct NodeCell {
    id: NodeId,
    node: RwLock<FieldNode>,
    dirty: AtomicBool,
    order_dirty: AtomicBool,
    /// Id of the owning group, 0 when unregistered
    owner: AtomicU64,
}

/// Shared, editable handle to a field node
#[derive(Debug, Clone)]
pub struct NodeHandle {
    cell: Arc<NodeCell>,
}

impl NodeHandle {
    /// Wrap a node
    pub fn new(node: FieldNode) -> Self {
        NodeHandle {
            cell: Arc::new(NodeCell {
                id: NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)),
                node: RwLock::new(node),
                dirty: AtomicBool::new(true),
                order_dirty: AtomicBool::new(true),
                owner: AtomicU64::new(0),
            }),
        }
    }

    /// Node identity
    #[inline]
    pub fn id(&self) -> NodeId {
        self.cell.id
    }

    /// Read access to the node
    pub fn read(&self) -> RwLockReadGuard<'_, FieldNode> {
        self.cell.node.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the current node state
    pub fn snapshot(&self) -> FieldNode {
        self.read().clone()
    }

    /// Mutate the node and mark it dirty.
    ///
    /// A change of `order` additionally marks the node order-dirty.
    pub fn edit<R>(&self, f: impl FnOnce(&mut FieldNode) -> R) -> R {
        let mut node = self.cell.node.write().unwrap_or_else(PoisonError::into_inner);
        let old_order = node.order;
        let result = f(&mut node);
        if node.order != old_order {
            self.cell.order_dirty.store(true, Ordering::Release);
        }
        self.cell.dirty.store(true, Ordering::Release);
        result
    }

    /// Set the combination order
    pub fn set_order(&self, order: i32) {
        self.edit(|n| n.order = order);
    }

    /// Set the local-to-field pose
    pub fn set_transform(&self, transform: Mat4) {
        self.edit(|n| n.transform = transform);
    }

    /// Whether an edit is waiting to be picked up
    pub fn is_dirty(&self) -> bool {
        self.cell.dirty.load(Ordering::Acquire)
    }

    /// Group this node is registered with, if any
    pub fn owner(&self) -> Option<u64> {
        match self.cell.owner.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    pub(crate) fn take_dirty(&self) -> bool {
        self.cell.dirty.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn take_order_dirty(&self) -> bool {
        self.cell.order_dirty.swap(false, Ordering::AcqRel)
    }

    /// Claim the node for `group`. Fails when another group owns it.
    pub(crate) fn claim(&self, group: u64) -> bool {
        match self
            .cell
            .owner
            .compare_exchange(0, group, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == group,
        }
    }

    pub(crate) fn release_claim(&self, group: u64) {
        let _ = self
            .cell
            .owner
            .compare_exchange(group, 0, Ordering::AcqRel, Ordering::Acquire);
    }

    pub(crate) fn downgrade(&self) -> WeakNode {
        WeakNode {
            id: self.cell.id,
            cell: Arc::downgrade(&self.cell),
        }
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for NodeHandle {}

/// Non-owning node reference held by a group
#[derive(Debug, Clone)]
pub(crate) struct WeakNode {
    id: NodeId,
    cell: Weak<NodeCell>,
}

impl WeakNode {
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn upgrade(&self) -> Option<NodeHandle> {
        self.cell.upgrade().map(|cell| NodeHandle { cell })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_is_dirty() {
        let h = NodeHandle::new(FieldNode::sphere(1.0));
        assert!(h.is_dirty());
        assert!(h.take_dirty());
        assert!(!h.take_dirty());
    }

    #[test]
    fn test_edit_marks_dirty_and_order() {
        let h = NodeHandle::new(FieldNode::sphere(1.0));
        h.take_dirty();
        h.take_order_dirty();

        h.edit(|n| n.smoothing = 0.5);
        assert!(h.take_dirty());
        assert!(!h.take_order_dirty());

        h.set_order(3);
        assert!(h.take_order_dirty());
        assert_eq!(h.read().order, 3);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let h = NodeHandle::new(FieldNode::sphere(1.0));
        assert!(h.claim(7));
        assert!(h.claim(7));
        assert!(!h.claim(8));
        h.release_claim(7);
        assert_eq!(h.owner(), None);
        assert!(h.claim(8));
    }

    #[test]
    fn test_weak_dies_with_last_handle() {
        let h = NodeHandle::new(FieldNode::sphere(1.0));
        let weak = h.downgrade();
        let h2 = h.clone();
        drop(h);
        assert!(weak.upgrade().is_some());
        drop(h2);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_ids_unique() {
        let a = NodeHandle::new(FieldNode::sphere(1.0));
        let b = NodeHandle::new(FieldNode::sphere(1.0));
        assert_ne!(a.id(), b.id());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
