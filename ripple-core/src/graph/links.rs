//! Dependency List Maintenance
//!
//! These functions keep the two linked lists of every node consistent while
//! derivations re-run with changing dependency sets.
//!
//! A re-evaluation is a two-pass mark-and-sweep over the target's source
//! list:
//!
//! 1. [`prepare_sources`] marks every existing node [`NOT_USED`] and points
//!    each source's active-node slot at it.
//! 2. During evaluation, [`add_dependency`] either confirms an existing node
//!    (moving it to the tail, so the list stays in access order) or appends a
//!    new one.
//! 3. [`cleanup_sources`] unlinks and recycles every node that is still
//!    [`NOT_USED`].
//!
//! The cost is proportional to the dependencies touched in the current pass,
//! not to history.
//!
//! No function here holds the pool borrow while calling into a source or
//! target, since those calls may run user code or release further nodes.

use std::rc::Rc;

use super::node::{DependencyNode, NodeId, NOT_USED};
use crate::reactive::runtime::{try_with_nodes, with_nodes};
use crate::reactive::{context, Flags, Source, SourceCore, TargetCore};

/// Record that the current evaluation context reads `source`.
///
/// Returns the node whose version the caller must stamp with the source's
/// current version, or `None` when there is no context or the dependency was
/// already confirmed in this pass.
pub(crate) fn add_dependency(source: &Rc<dyn Source>) -> Option<NodeId> {
    let context = context::current()?;
    let target = context.target_core();
    let slot = &source.source_core().node;

    let existing = slot.get();
    let reusable = existing.filter(|&id| {
        with_nodes(|pool| pool.get(id).is_some_and(|node| node.belongs_to(target.id)))
    });

    let Some(id) = reusable else {
        let tail = target.sources.get();
        let node = DependencyNode {
            prev_source: tail,
            rollback: existing,
            ..DependencyNode::new(Rc::clone(source), Rc::downgrade(&context), target.id)
        };
        let id = with_nodes(|pool| {
            let id = pool.acquire(node);
            if let Some(tail) = tail {
                pool[tail].next_source = Some(id);
            }
            id
        });
        target.sources.set(Some(id));
        slot.set(Some(id));

        if target.flags.get().contains(Flags::TRACKING) {
            source.subscribe(id);
        }
        return Some(id);
    };

    let confirmed = with_nodes(|pool| {
        if pool[id].version != NOT_USED {
            return false;
        }
        pool[id].version = 0;

        // Move to the tail so the list reflects access order.
        if let Some(next) = pool[id].next_source {
            let prev = pool[id].prev_source;
            pool[next].prev_source = prev;
            if let Some(prev) = prev {
                pool[prev].next_source = Some(next);
            }

            let tail = target.sources.get();
            pool[id].prev_source = tail;
            pool[id].next_source = None;
            if let Some(tail) = tail {
                pool[tail].next_source = Some(id);
            }
            target.sources.set(Some(id));
        }
        true
    });

    confirmed.then_some(id)
}

/// Stamp `node` with the version of the source it just read.
pub(crate) fn record_version(node: NodeId, version: i32) {
    with_nodes(|pool| pool[node].version = version);
}

/// Mark every dependency of `target` as tentatively unused before it
/// re-evaluates. Leaves `target.sources` pointing at the tail.
pub(crate) fn prepare_sources(target: &TargetCore) {
    with_nodes(|pool| {
        let mut cursor = target.sources.get();
        while let Some(id) = cursor {
            let node = &mut pool[id];
            if let Some(source) = &node.source {
                let slot = &source.source_core().node;
                if let Some(previous) = slot.get() {
                    node.rollback = Some(previous);
                }
                slot.set(Some(id));
            }
            node.version = NOT_USED;

            if node.next_source.is_none() {
                target.sources.set(Some(id));
                break;
            }
            cursor = node.next_source;
        }
    });
}

/// Drop every dependency the last evaluation did not confirm, and restore the
/// active-node slots claimed by [`prepare_sources`] and [`add_dependency`].
pub(crate) fn cleanup_sources(target: &TargetCore) {
    let mut cursor = target.sources.get();
    let mut head = None;

    while let Some(id) = cursor {
        let (source, prev, next, version, rollback) = with_nodes(|pool| {
            let node = &mut pool[id];
            (
                node.source.clone(),
                node.prev_source,
                node.next_source,
                node.version,
                node.rollback.take(),
            )
        });

        if let Some(source) = &source {
            source.source_core().node.set(rollback);
        }

        if version == NOT_USED {
            if let Some(source) = &source {
                source.unsubscribe(id);
            }
            let released = with_nodes(|pool| {
                if let Some(prev) = prev {
                    pool[prev].next_source = next;
                }
                if let Some(next) = next {
                    pool[next].prev_source = prev;
                }
                pool.release(id)
            });
            drop(released);
        } else {
            head = Some(id);
        }

        cursor = prev;
    }

    target.sources.set(head);
}

/// Whether any source of `target` changed since the target last observed it.
///
/// Sources are checked in access order and refreshed on the way, so the
/// first changed dependency short-circuits the rest.
pub(crate) fn needs_to_recompute(target: &TargetCore) -> bool {
    let mut cursor = target.sources.get();
    while let Some(id) = cursor {
        let (source, seen) = with_nodes(|pool| (pool[id].source.clone(), pool[id].version));
        if let Some(source) = source {
            let core = source.source_core();
            if core.version.get() != seen || !source.refresh() || core.version.get() != seen {
                return true;
            }
        }
        cursor = with_nodes(|pool| pool[id].next_source);
    }
    false
}

/// Prepend `node` to the target list of `source`.
pub(crate) fn link_target(source: &SourceCore, node: NodeId) {
    let head = source.targets.get();
    if head == Some(node) {
        return;
    }

    let linked = with_nodes(|pool| {
        if pool[node].prev_target.is_some() {
            return false;
        }
        pool[node].next_target = head;
        if let Some(head) = head {
            pool[head].prev_target = Some(node);
        }
        true
    });
    if linked {
        source.targets.set(Some(node));
    }
}

/// Remove `node` from the target list of `source`.
pub(crate) fn unlink_target(source: &SourceCore, node: NodeId) {
    if source.targets.get().is_none() {
        return;
    }

    let next = with_nodes(|pool| {
        let prev = pool[node].prev_target.take();
        let next = pool[node].next_target.take();
        if let Some(prev) = prev {
            pool[prev].next_target = next;
        }
        if let Some(next) = next {
            pool[next].prev_target = prev;
        }
        next
    });
    if source.targets.get() == Some(node) {
        source.targets.set(next);
    }
}

/// Notify every observer of `source`, most recently subscribed first.
pub(crate) fn notify_targets(source: &SourceCore) {
    let mut cursor = source.targets.get();
    while let Some(id) = cursor {
        let (target, next) = with_nodes(|pool| {
            let node = &pool[id];
            (node.target.as_ref().and_then(|t| t.upgrade()), node.next_target)
        });
        if let Some(target) = target {
            target.notify();
        }
        cursor = next;
    }
}

/// Subscribe every source of `target` to the node linking it to `target`.
pub(crate) fn subscribe_sources(target: &TargetCore) {
    for_each_source(target, |source, id| source.subscribe(id));
}

/// Unsubscribe every source of `target` from the node linking it to
/// `target`.
pub(crate) fn unsubscribe_sources(target: &TargetCore) {
    for_each_source(target, |source, id| source.unsubscribe(id));
}

/// Clear NOTIFIED on every computed upstream of `target`.
pub(crate) fn reset_notified_sources(target: &TargetCore) {
    for_each_source(target, |source, _| source.reset_notified());
}

fn for_each_source(target: &TargetCore, mut f: impl FnMut(&Rc<dyn Source>, NodeId)) {
    let mut cursor = target.sources.get();
    while let Some(id) = cursor {
        let (source, next) = with_nodes(|pool| (pool[id].source.clone(), pool[id].next_source));
        if let Some(source) = &source {
            f(source, id);
        }
        cursor = next;
    }
}

/// Detach `target` from all of its sources and return its nodes to the pool.
///
/// Safe to call from `Drop`: if the runtime is already gone (thread
/// teardown) the nodes go with it.
pub(crate) fn release_sources(target: &TargetCore, unsubscribe: bool) {
    let mut cursor = target.sources.take();
    while let Some(id) = cursor {
        let Ok((source, next)) = try_with_nodes(|pool| (pool[id].source.clone(), pool[id].next_source))
        else {
            return;
        };

        if unsubscribe {
            if let Some(source) = &source {
                source.unsubscribe(id);
            }
        }
        let released = try_with_nodes(|pool| pool.release(id));
        drop(released);
        drop(source);

        cursor = next;
    }
}

/// Number of nodes in a target list.
pub(crate) fn count_targets(source: &SourceCore) -> usize {
    let mut count = 0;
    let mut cursor = source.targets.get();
    while let Some(id) = cursor {
        count += 1;
        cursor = with_nodes(|pool| pool[id].next_target);
    }
    count
}

/// Number of nodes in a source list.
pub(crate) fn count_sources(target: &TargetCore) -> usize {
    let mut count = 0;
    let mut cursor = target.sources.get();
    while let Some(id) = cursor {
        count += 1;
        cursor = with_nodes(|pool| pool[id].next_source);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Computed, Signal};
    use std::cell::Cell;

    #[test]
    fn stale_branch_is_pruned() {
        let cond = Signal::new(true);
        let a = Signal::new(1);
        let b = Signal::new(2);
        let runs = Rc::new(Cell::new(0));

        let c = {
            let (cond, a, b, runs) = (cond.clone(), a.clone(), b.clone(), runs.clone());
            Computed::new(move || {
                runs.set(runs.get() + 1);
                if cond.get() { a.get() } else { b.get() }
            })
        };

        assert_eq!(c.get().unwrap(), 1);
        assert_eq!(c.source_count(), 2);

        cond.set(false).unwrap();
        assert_eq!(c.get().unwrap(), 2);
        assert_eq!(c.source_count(), 2);
        assert_eq!(runs.get(), 2);

        // `a` is no longer a dependency, so writing it does not force a
        // re-derivation.
        a.set(10).unwrap();
        assert_eq!(c.get().unwrap(), 2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn reading_the_same_signal_twice_keeps_one_node() {
        let a = Signal::new(3);
        let c = {
            let a = a.clone();
            Computed::new(move || a.get() + a.get())
        };
        assert_eq!(c.get().unwrap(), 6);
        assert_eq!(c.source_count(), 1);

        a.set(4).unwrap();
        assert_eq!(c.get().unwrap(), 8);
        assert_eq!(c.source_count(), 1);
    }

    #[test]
    fn active_node_slots_are_restored_after_evaluation() {
        let a = Signal::new(1);
        let inner = {
            let a = a.clone();
            Computed::new(move || a.get() * 2)
        };
        let outer = {
            let (a, inner) = (a.clone(), inner.clone());
            Computed::try_new(move || Ok(a.get() + inner.get()?))
        };

        assert_eq!(outer.get().unwrap(), 3);
        assert!(a.as_source().source_core().node.get().is_none());

        a.set(2).unwrap();
        assert_eq!(outer.get().unwrap(), 6);
        assert!(a.as_source().source_core().node.get().is_none());
    }
}
