//! Reactive Runtime
//!
//! The runtime holds the state shared by every signal, computed and effect
//! on a thread:
//!
//! - the global version counter, bumped on every effective write
//! - the batch depth, flush-pass counter and queue of notified effects
//! - the dependency-node pool
//! - the registry of live effects (effects stay alive until disposed)
//! - the debug registry of everything created while it is enabled
//!
//! # Thread Confinement
//!
//! All of this lives in a `thread_local!`, and every handle is built on `Rc`,
//! so reactive values are `!Send` and `!Sync`. Each thread that uses the
//! crate gets its own independent graph. The node-reuse algorithm relies on
//! a per-source "active node" slot that is only correct when a single thread
//! evaluates at a time, so there is no attempt to share graphs across
//! threads.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread::AccessError;

use indexmap::IndexMap;
use serde::Serialize;

use super::context;
use super::effect::EffectInner;
use super::subscriber::{ReactiveId, ReactiveKind};
use crate::config::RuntimeConfig;
use crate::graph::NodePool;

/// An entry in the debug registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugEntry {
    pub id: ReactiveId,
    pub kind: ReactiveKind,
    pub label: Option<String>,
}

/// Point-in-time counters describing the runtime on the current thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub global_version: u32,
    pub batch_depth: u32,
    /// Dependency nodes currently linked into the graph.
    pub live_nodes: usize,
    /// Released dependency nodes waiting for reuse.
    pub pooled_nodes: usize,
    /// Effects created and not yet disposed.
    pub live_effects: usize,
    /// Entries in the debug registry.
    pub registered: usize,
}

pub(crate) struct RuntimeState {
    pub config: Cell<RuntimeConfig>,
    pub global_version: Cell<u32>,
    pub batch_depth: Cell<u32>,
    pub batch_iteration: Cell<u32>,
    /// Head of the intrusive list of effects waiting for the current flush.
    pub batched_effect: RefCell<Option<Rc<EffectInner>>>,
    nodes: RefCell<NodePool>,
    effects: RefCell<IndexMap<ReactiveId, Rc<EffectInner>>>,
    registry: RefCell<IndexMap<ReactiveId, DebugEntry>>,
}

impl RuntimeState {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            config: Cell::new(config),
            global_version: Cell::new(0),
            batch_depth: Cell::new(0),
            batch_iteration: Cell::new(0),
            batched_effect: RefCell::new(None),
            nodes: RefCell::new(NodePool::new(config.node_pool_capacity)),
            effects: RefCell::new(IndexMap::new()),
            registry: RefCell::new(IndexMap::new()),
        }
    }
}

thread_local! {
    static RUNTIME: RuntimeState = RuntimeState::new(RuntimeConfig::default());
}

pub(crate) fn with_runtime<R>(f: impl FnOnce(&RuntimeState) -> R) -> R {
    RUNTIME.with(f)
}

/// Borrow the node pool. `f` must not call back into sources or targets.
pub(crate) fn with_nodes<R>(f: impl FnOnce(&mut NodePool) -> R) -> R {
    RUNTIME.with(|rt| f(&mut rt.nodes.borrow_mut()))
}

/// Like [`with_nodes`], but tolerates the runtime having been torn down.
pub(crate) fn try_with_nodes<R>(f: impl FnOnce(&mut NodePool) -> R) -> Result<R, AccessError> {
    RUNTIME.try_with(|rt| f(&mut rt.nodes.borrow_mut()))
}

pub(crate) fn global_version() -> u32 {
    with_runtime(|rt| rt.global_version.get())
}

pub(crate) fn bump_global_version() {
    with_runtime(|rt| rt.global_version.set(rt.global_version.get().wrapping_add(1)));
}

/// Close a batch without flushing it.
pub(crate) fn leave_batch() {
    let _ = RUNTIME.try_with(|rt| rt.batch_depth.set(rt.batch_depth.get().saturating_sub(1)));
}

/// Keep `effect` alive until it is disposed.
pub(crate) fn retain_effect(effect: Rc<EffectInner>) {
    let id = effect.id();
    with_runtime(|rt| rt.effects.borrow_mut().insert(id, effect));
}

pub(crate) fn release_effect(id: ReactiveId) {
    let removed = RUNTIME.try_with(|rt| rt.effects.borrow_mut().shift_remove(&id));
    // Dropped here, outside the registry borrow.
    drop(removed);
}

pub(crate) fn register(id: ReactiveId, kind: ReactiveKind) {
    with_runtime(|rt| {
        if rt.config.get().debug_registry {
            rt.registry
                .borrow_mut()
                .insert(id, DebugEntry { id, kind, label: None });
        }
    });
}

pub(crate) fn set_label(id: ReactiveId, label: String) {
    with_runtime(|rt| {
        if let Some(entry) = rt.registry.borrow_mut().get_mut(&id) {
            entry.label = Some(label);
        }
    });
}

pub(crate) fn unregister(id: ReactiveId) {
    let _ = RUNTIME.try_with(|rt| rt.registry.borrow_mut().shift_remove(&id));
}

/// Public facade over the runtime of the current thread.
pub struct Runtime;

impl Runtime {
    /// Replace the configuration of the current thread's runtime.
    pub fn configure(config: RuntimeConfig) {
        with_runtime(|rt| {
            rt.config.set(config);
            rt.nodes.borrow_mut().set_capacity(config.node_pool_capacity);
            if !config.debug_registry {
                rt.registry.borrow_mut().clear();
            }
        });
        tracing::debug!(?config, "reactive runtime reconfigured");
    }

    /// The configuration currently in effect on this thread.
    pub fn config() -> RuntimeConfig {
        with_runtime(|rt| rt.config.get())
    }

    pub fn stats() -> RuntimeStats {
        with_runtime(|rt| {
            let nodes = rt.nodes.borrow();
            RuntimeStats {
                global_version: rt.global_version.get(),
                batch_depth: rt.batch_depth.get(),
                live_nodes: nodes.live(),
                pooled_nodes: nodes.pooled(),
                live_effects: rt.effects.borrow().len(),
                registered: rt.registry.borrow().len(),
            }
        })
    }

    /// Everything in the debug registry, in creation order.
    pub fn debug_entries() -> Vec<DebugEntry> {
        with_runtime(|rt| rt.registry.borrow().values().cloned().collect())
    }

    /// Check if we're inside a computed or effect evaluation.
    pub fn is_tracking() -> bool {
        context::is_active()
    }

    /// Check if a batch is open.
    pub fn is_batching() -> bool {
        with_runtime(|rt| rt.batch_depth.get() > 0)
    }
}
