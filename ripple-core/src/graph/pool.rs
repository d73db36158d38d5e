//! Node Pool
//!
//! Dependency nodes are created and destroyed constantly while derivations
//! re-run with shifting dependency sets. The pool keeps them in one arena and
//! recycles released slots through a free list, so steady-state evaluation
//! does not allocate.
//!
//! The free list is bounded by `capacity`. Vacant slots at the end of the
//! arena are dropped first; free ids beyond the bound are forgotten and
//! their slots stay empty until the tail shrinks past them.

use std::ops::{Index, IndexMut};
use std::rc::Rc;

use super::node::{DependencyNode, NodeId};
use crate::reactive::Source;

pub(crate) struct NodePool {
    slots: Vec<DependencyNode>,
    free: Vec<NodeId>,
    /// Vacant slots that are not on the free list.
    holes: usize,
    capacity: usize,
}

impl NodePool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            holes: 0,
            capacity,
        }
    }

    /// Store `node` in a recycled slot if one is free, otherwise in a new one.
    pub(crate) fn acquire(&mut self, node: DependencyNode) -> NodeId {
        while let Some(id) = self.free.pop() {
            if let Some(slot) = self.slots.get_mut(id.index()) {
                if slot.is_vacant() {
                    *slot = node;
                    return id;
                }
            }
        }

        let id = NodeId::from_index(self.slots.len());
        self.slots.push(node);
        id
    }

    /// Zero the slot and return it to the free list.
    ///
    /// Returns the node's source so the caller can drop it after releasing
    /// any borrow of the pool: dropping the last reference to a computed
    /// releases that computed's own nodes.
    #[must_use = "drop the returned source outside the pool borrow"]
    pub(crate) fn release(&mut self, id: NodeId) -> Option<Rc<dyn Source>> {
        let slot = self.slots.get_mut(id.index())?;
        let source = std::mem::take(slot).source;
        if source.is_some() {
            self.free.push(id);
            self.trim();
        }
        source
    }

    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.trim();
    }

    fn trim(&mut self) {
        if self.free.len() <= self.capacity {
            return;
        }

        let mut len = self.slots.len();
        while len > 0 && self.slots[len - 1].is_vacant() {
            len -= 1;
        }
        if len < self.slots.len() {
            let vacated = self.slots.len() - len;
            let before = self.free.len();
            self.slots.truncate(len);
            self.free.retain(|id| id.index() < len);
            self.holes -= vacated - (before - self.free.len());
        }

        if self.free.len() > self.capacity {
            let surplus = self.free.len() - self.capacity;
            self.free.drain(..surplus);
            self.holes += surplus;
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&DependencyNode> {
        self.slots.get(id.index())
    }

    /// Number of nodes currently linked into the graph.
    pub(crate) fn live(&self) -> usize {
        self.slots.len() - self.free.len() - self.holes
    }

    /// Number of free slots waiting for reuse.
    pub(crate) fn pooled(&self) -> usize {
        self.free.len()
    }
}

impl Index<NodeId> for NodePool {
    type Output = DependencyNode;

    fn index(&self, id: NodeId) -> &DependencyNode {
        &self.slots[id.index()]
    }
}

impl IndexMut<NodeId> for NodePool {
    fn index_mut(&mut self, id: NodeId) -> &mut DependencyNode {
        &mut self.slots[id.index()]
    }
}
