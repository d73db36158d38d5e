//! Source and target roles in the dependency graph.
//!
//! Every reactive value plays one or both of two roles:
//!
//! - a **source** can be read and observed (signals and computeds)
//! - a **target** reads sources while it evaluates (computeds and effects)
//!
//! The set of implementors is closed: [`Signal`](super::Signal) is a source,
//! [`Effect`](super::Effect) is a target, and [`Computed`](super::Computed)
//! is both.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use serde::Serialize;

use crate::graph::{links, NodeId};

/// Unique identifier for a signal, computed or effect.
///
/// Identifiers come from a process-wide counter, so they stay unique even
/// though each thread runs its own reactive runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ReactiveId(u64);

impl ReactiveId {
    /// Generate a new unique id.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ReactiveId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReactiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What kind of reactive value an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactiveKind {
    Signal,
    Computed,
    Effect,
}

bitflags! {
    /// Evaluation state of a computed or effect.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct Flags: u8 {
        /// Currently deriving / running its callback.
        const RUNNING = 1 << 0;
        /// Already notified during the current write.
        const NOTIFIED = 1 << 1;
        /// A push notification arrived since the last refresh.
        const OUTDATED = 1 << 2;
        const DISPOSED = 1 << 3;
        /// The stored result is an error.
        const HAS_ERROR = 1 << 4;
        /// Subscribed to its sources (effects always are).
        const TRACKING = 1 << 5;
    }
}

/// Graph state shared by everything that can be depended upon.
pub(crate) struct SourceCore {
    pub id: ReactiveId,
    pub version: Cell<i32>,
    /// Head of the list of nodes observing this source.
    pub targets: Cell<Option<NodeId>>,
    /// The node the innermost evaluating context uses for this source.
    pub node: Cell<Option<NodeId>>,
}

impl SourceCore {
    pub(crate) fn new(id: ReactiveId) -> Self {
        Self {
            id,
            version: Cell::new(0),
            targets: Cell::new(None),
            node: Cell::new(None),
        }
    }

    pub(crate) fn has_targets(&self) -> bool {
        self.targets.get().is_some()
    }
}

/// Graph state shared by everything that reads sources while evaluating.
pub(crate) struct TargetCore {
    pub id: ReactiveId,
    /// Head of this target's dependency list; the tail while evaluating.
    pub sources: Cell<Option<NodeId>>,
    pub flags: Cell<Flags>,
}

impl TargetCore {
    pub(crate) fn new(id: ReactiveId, flags: Flags) -> Self {
        Self {
            id,
            sources: Cell::new(None),
            flags: Cell::new(flags),
        }
    }

    pub(crate) fn has(&self, flags: Flags) -> bool {
        self.flags.get().contains(flags)
    }

    pub(crate) fn insert(&self, flags: Flags) {
        self.flags.set(self.flags.get() | flags);
    }

    pub(crate) fn remove(&self, flags: Flags) {
        self.flags.set(self.flags.get() - flags);
    }
}

/// Something that can be read and observed.
pub(crate) trait Source {
    fn source_core(&self) -> &SourceCore;

    /// Bring the value up to date. Returns `false` when it cannot be
    /// refreshed right now because it is in the middle of evaluating.
    fn refresh(&self) -> bool {
        true
    }

    /// Start pushing notifications to the target of `node`.
    fn subscribe(&self, node: NodeId) {
        links::link_target(self.source_core(), node);
    }

    /// Stop pushing notifications to the target of `node`.
    fn unsubscribe(&self, node: NodeId) {
        links::unlink_target(self.source_core(), node);
    }

    /// Forget a notification that will never be followed by a refresh.
    fn reset_notified(&self) {}
}

/// Something that reads sources while it evaluates.
pub(crate) trait Target {
    fn target_core(&self) -> &TargetCore;

    /// One of this target's sources changed.
    fn notify(&self);
}
