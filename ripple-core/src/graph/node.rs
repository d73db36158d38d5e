//! Dependency Nodes
//!
//! A dependency node is the edge between one source (a signal or computed)
//! and one target (a computed or effect). Every node sits in two doubly
//! linked lists at once:
//!
//! - the target's source list, through `prev_source` / `next_source`
//! - the source's target list, through `prev_target` / `next_target`
//!
//! Links are arena indices rather than pointers, so the graph can be cyclic
//! in shape without any ownership cycles.

use std::fmt;
use std::rc::{Rc, Weak};

use crate::reactive::{ReactiveId, Source, Target};

/// Node version meaning "left over from the previous evaluation and not yet
/// confirmed by the current one".
pub const NOT_USED: i32 = -1;

/// Index of a dependency node in the node pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "dependency node arena overflow");
        Self(index as u32)
    }

    /// Position in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// An edge in the dependency graph.
///
/// A live node holds its source strongly (a target keeps what it reads
/// alive) and its target weakly (a source never keeps its observers alive).
/// A vacant slot has no source.
#[derive(Default)]
pub(crate) struct DependencyNode {
    pub source: Option<Rc<dyn Source>>,
    pub target: Option<Weak<dyn Target>>,
    pub target_id: Option<ReactiveId>,

    /// The source version last observed by the target, or [`NOT_USED`].
    pub version: i32,

    pub prev_source: Option<NodeId>,
    pub next_source: Option<NodeId>,
    pub prev_target: Option<NodeId>,
    pub next_target: Option<NodeId>,

    /// The source's active-node slot as it was before this node claimed it.
    pub rollback: Option<NodeId>,
}

impl DependencyNode {
    pub(crate) fn new(
        source: Rc<dyn Source>,
        target: Weak<dyn Target>,
        target_id: ReactiveId,
    ) -> Self {
        Self {
            source: Some(source),
            target: Some(target),
            target_id: Some(target_id),
            ..Self::default()
        }
    }

    pub(crate) fn is_vacant(&self) -> bool {
        self.source.is_none()
    }

    /// Whether this node connects `target` to its source.
    pub(crate) fn belongs_to(&self, target: ReactiveId) -> bool {
        self.target_id == Some(target)
    }
}

impl fmt::Debug for DependencyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyNode")
            .field("source", &self.source.as_ref().map(|s| s.source_core().id))
            .field("target", &self.target_id)
            .field("version", &self.version)
            .field("prev_source", &self.prev_source)
            .field("next_source", &self.next_source)
            .field("prev_target", &self.prev_target)
            .field("next_target", &self.next_target)
            .field("rollback", &self.rollback)
            .finish()
    }
}

/// The next version after `version`, skipping the reserved sentinels on
/// overflow.
pub(crate) fn next_version(version: i32) -> i32 {
    if version == i32::MAX {
        1
    } else {
        version + 1
    }
}
