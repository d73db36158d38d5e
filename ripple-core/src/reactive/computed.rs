//! Computed Implementation
//!
//! A Computed is a cached derived value. It is a source (others can read and
//! observe it) and a target (it reads other sources while deriving).
//!
//! # How Computeds Work
//!
//! 1. Nothing runs at creation. The derivation runs the first time the value
//!    is read.
//!
//! 2. When a dependency changes, the computed is only marked outdated. It
//!    recomputes the next time someone reads it (pull), never on its own.
//!
//! 3. Before re-deriving, the computed checks whether any of its sources
//!    actually changed version. If none did, the cached value is kept.
//!
//! 4. If the new value equals the old one, the version is not bumped, so
//!    downstream computeds and effects see nothing changed.
//!
//! # Subscription
//!
//! A computed only links itself into its sources' observer lists while it
//! has observers of its own. An unobserved computed costs nothing on writes;
//! it detects staleness on read by comparing the global version and its
//! sources' versions instead.
//!
//! # Errors
//!
//! A derivation that fails stores its error. Every read returns a copy of
//! that error until a later derivation succeeds.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use super::context::EvalScope;
use super::effect::Effect;
use super::runtime;
use super::subscriber::{Flags, ReactiveId, ReactiveKind, Source, SourceCore, Target, TargetCore};
use super::untracked;
use crate::error::{ReactiveError, Result};
use crate::graph::{links, next_version, NodeId};

pub(crate) struct ComputedInner<T> {
    source: SourceCore,
    target: TargetCore,
    /// Global version at the last refresh.
    global_version_seen: Cell<u32>,
    derive: Box<dyn Fn() -> Result<T>>,
    value: RefCell<Option<T>>,
    error: RefCell<Option<ReactiveError>>,
    equals: fn(&T, &T) -> bool,
    weak_self: Weak<ComputedInner<T>>,
}

impl<T: 'static> ComputedInner<T> {
    fn cycle(&self) -> ReactiveError {
        ReactiveError::Cycle { id: self.source.id }
    }

    fn store(&self, result: Result<T>) {
        let target = &self.target;
        match result {
            Ok(value) => {
                let changed = target.has(Flags::HAS_ERROR)
                    || match &*self.value.borrow() {
                        Some(old) => !(self.equals)(old, &value),
                        None => true,
                    };
                if !changed {
                    return;
                }
                let previous = self.value.replace(Some(value));
                let stale_error = self.error.take();
                drop((previous, stale_error));
                target.remove(Flags::HAS_ERROR);
            }
            Err(err) => {
                let previous = self.error.replace(Some(err));
                drop(previous);
                target.insert(Flags::HAS_ERROR);
            }
        }

        let version = next_version(self.source.version.get());
        self.source.version.set(version);
        tracing::trace!(
            id = %self.source.id,
            version,
            failed = target.has(Flags::HAS_ERROR),
            "computed re-derived"
        );
    }
}

impl<T: 'static> Source for ComputedInner<T> {
    fn source_core(&self) -> &SourceCore {
        &self.source
    }

    fn refresh(&self) -> bool {
        let target = &self.target;
        target.remove(Flags::NOTIFIED);

        if target.has(Flags::RUNNING) {
            return false;
        }

        // Subscribed and not notified since the last refresh: nothing upstream
        // can have changed.
        if target.has(Flags::TRACKING) && !target.has(Flags::OUTDATED) {
            return true;
        }
        target.remove(Flags::OUTDATED);

        let global = runtime::global_version();
        if self.global_version_seen.get() == global {
            return true;
        }
        self.global_version_seen.set(global);

        target.insert(Flags::RUNNING);
        if self.source.version.get() > 0 && !links::needs_to_recompute(target) {
            target.remove(Flags::RUNNING);
            return true;
        }

        let Some(this) = self.weak_self.upgrade() else {
            target.remove(Flags::RUNNING);
            return false;
        };
        let this: Rc<dyn Target> = this;

        links::prepare_sources(target);
        let result = {
            let _scope = EvalScope::enter(Some(this));
            (self.derive)()
        };
        self.store(result);
        links::cleanup_sources(target);
        target.remove(Flags::RUNNING);
        true
    }

    fn subscribe(&self, node: NodeId) {
        if !self.source.has_targets() {
            self.target.insert(Flags::OUTDATED | Flags::TRACKING);
            links::subscribe_sources(&self.target);
        }
        links::link_target(&self.source, node);
    }

    fn unsubscribe(&self, node: NodeId) {
        if !self.source.has_targets() {
            return;
        }
        links::unlink_target(&self.source, node);
        if !self.source.has_targets() {
            self.target.remove(Flags::TRACKING);
            links::unsubscribe_sources(&self.target);
        }
    }

    // OUTDATED stays set so the next read still re-derives.
    fn reset_notified(&self) {
        if self.target.has(Flags::NOTIFIED) {
            self.target.remove(Flags::NOTIFIED);
            links::reset_notified_sources(&self.target);
        }
    }
}

impl<T: 'static> Target for ComputedInner<T> {
    fn target_core(&self) -> &TargetCore {
        &self.target
    }

    fn notify(&self) {
        if self.target.has(Flags::NOTIFIED) {
            return;
        }
        self.target.insert(Flags::OUTDATED | Flags::NOTIFIED);
        links::notify_targets(&self.source);
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        links::release_sources(&self.target, self.target.has(Flags::TRACKING));
        runtime::unregister(self.source.id);
    }
}

/// A cached value derived from other signals and computeds.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let doubled = {
///     let count = count.clone();
///     Computed::new(move || count.get() * 2)
/// };
///
/// assert_eq!(doubled.get().unwrap(), 4);
///
/// count.set(5).unwrap();
/// assert_eq!(doubled.get().unwrap(), 10);
/// ```
pub struct Computed<T>(Rc<ComputedInner<T>>);

impl<T: PartialEq + 'static> Computed<T> {
    /// Create a computed from an infallible derivation.
    pub fn new(derive: impl Fn() -> T + 'static) -> Self {
        Self::try_new(move || Ok(derive()))
    }

    /// Create a computed whose derivation may fail.
    ///
    /// A failure is stored and returned by every read until a later
    /// derivation succeeds.
    pub fn try_new(derive: impl Fn() -> Result<T> + 'static) -> Self {
        Self::with_equality(derive, |a, b| a == b)
    }
}

impl<T: 'static> Computed<T> {
    /// Create a computed that compares successive values with `equals`.
    pub fn with_equality(
        derive: impl Fn() -> Result<T> + 'static,
        equals: fn(&T, &T) -> bool,
    ) -> Self {
        let id = ReactiveId::new();
        runtime::register(id, ReactiveKind::Computed);
        let global = runtime::global_version();

        Self(Rc::new_cyclic(|weak_self| ComputedInner {
            source: SourceCore::new(id),
            target: TargetCore::new(id, Flags::empty()),
            // Anything but the current global version, so the first read derives.
            global_version_seen: Cell::new(global.wrapping_sub(1)),
            derive: Box::new(derive),
            value: RefCell::new(None),
            error: RefCell::new(None),
            equals,
            weak_self: weak_self.clone(),
        }))
    }

    /// Name this computed in the debug registry.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        runtime::set_label(self.id(), label.into());
        self
    }

    pub fn id(&self) -> ReactiveId {
        self.0.source.id
    }

    /// Number of times the value (or error) changed.
    pub fn version(&self) -> i32 {
        self.0.source.version.get()
    }

    /// Bring the value up to date and read it by reference.
    ///
    /// Registers a dependency when called within a computed or effect.
    /// Fails with [`ReactiveError::Cycle`] when read from its own derivation,
    /// or with the stored error if the derivation failed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let inner = &self.0;
        if inner.target.has(Flags::RUNNING) {
            return Err(inner.cycle());
        }

        let node = links::add_dependency(&self.as_source());
        inner.refresh();
        if let Some(node) = node {
            links::record_version(node, inner.source.version.get());
        }

        if inner.target.has(Flags::HAS_ERROR) {
            let stored = inner.error.borrow().clone();
            return Err(stored.unwrap_or_else(|| inner.cycle()));
        }
        match &*inner.value.borrow() {
            Some(value) => Ok(f(value)),
            None => Err(inner.cycle()),
        }
    }

    /// Number of computeds and effects currently subscribed to this computed.
    pub fn observer_count(&self) -> usize {
        links::count_targets(&self.0.source)
    }

    /// Number of dependencies recorded by the last derivation.
    pub fn source_count(&self) -> usize {
        links::count_sources(&self.0.target)
    }

    pub(crate) fn as_source(&self) -> Rc<dyn Source> {
        self.0.clone()
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Get the current value, recomputing first if it is stale.
    pub fn get(&self) -> Result<T> {
        self.with(T::clone)
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> Result<T> {
        untracked(|| self.get())
    }

    /// Call `f` with the value now and after every change.
    ///
    /// A derivation error is returned from here (or from the write that
    /// caused it) and disposes the subscription.
    pub fn subscribe(&self, mut f: impl FnMut(&T) + 'static) -> Result<Effect> {
        let computed = self.clone();
        Effect::new(move || -> Result<()> {
            let value = computed.get()?;
            untracked(|| f(&value));
            Ok(())
        })
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Debug> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.0.source.id)
            .field("version", &self.0.source.version.get())
            .field("flags", &self.0.target.flags.get())
            .field("value", &*self.0.value.borrow())
            .finish()
    }
}

/// Create a computed. Shorthand for [`Computed::new`].
pub fn computed<T: PartialEq + 'static>(derive: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(derive)
}

/// Create a computed from a fallible derivation. Shorthand for
/// [`Computed::try_new`].
pub fn try_computed<T: PartialEq + 'static>(
    derive: impl Fn() -> Result<T> + 'static,
) -> Computed<T> {
    Computed::try_new(derive)
}
