//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within an evaluation context (computed/effect),
//!    the signal links itself into that context's dependency list.
//!
//! 2. When a signal's value changes, its version is bumped and every
//!    observer is notified: computeds are marked outdated, effects are queued.
//!
//! 3. Writes that leave the value unchanged do nothing at all.
//!
//! # Fast Path
//!
//! Most signals in practice are leaves with zero or one observer. A write
//! to a signal with no observers is a plain value and version bump with no
//! graph traversal and no batch.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::batch::BatchScope;
use super::effect::Effect;
use super::runtime;
use super::subscriber::{ReactiveId, ReactiveKind, Source, SourceCore};
use super::untracked;
use crate::error::Result;
use crate::graph::{links, next_version};

pub(crate) struct SignalInner<T> {
    core: SourceCore,
    value: RefCell<T>,
    equals: fn(&T, &T) -> bool,
}

impl<T> Source for SignalInner<T> {
    fn source_core(&self) -> &SourceCore {
        &self.core
    }
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        runtime::unregister(self.core.id);
    }
}

/// A reactive cell holding a value of type `T`.
///
/// Cloning a signal yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use ripple_core::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies observers)
/// count.set(5).unwrap();
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>(Rc<SignalInner<T>>);

impl<T: PartialEq + 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    ///
    /// Writes are compared with `PartialEq`; equal writes are ignored.
    pub fn new(value: T) -> Self {
        Self::with_equality(value, |a, b| a == b)
    }
}

impl<T: 'static> Signal<T> {
    /// Create a signal that decides whether a write changes the value with
    /// `equals`.
    ///
    /// Use `|_, _| false` for a signal that notifies on every write.
    pub fn with_equality(value: T, equals: fn(&T, &T) -> bool) -> Self {
        let id = ReactiveId::new();
        runtime::register(id, ReactiveKind::Signal);
        Self(Rc::new(SignalInner {
            core: SourceCore::new(id),
            value: RefCell::new(value),
            equals,
        }))
    }

    /// Name this signal in the debug registry.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        runtime::set_label(self.id(), label.into());
        self
    }

    pub fn id(&self) -> ReactiveId {
        self.0.core.id
    }

    /// Number of effective writes so far.
    pub fn version(&self) -> i32 {
        self.0.core.version.get()
    }

    /// Read the value by reference.
    ///
    /// If called within a computed or effect, this also registers the signal
    /// as one of its dependencies. `f` must not write to this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if let Some(node) = links::add_dependency(&self.as_source()) {
            links::record_version(node, self.version());
        }
        f(&*self.0.value.borrow())
    }

    /// Read the value by reference without registering a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.0.value.borrow())
    }

    /// Set a new value and notify observers.
    ///
    /// If the signal has observers, the write opens a batch; when it is the
    /// outermost batch, notified effects run before this returns and any
    /// errors they produce are returned here.
    pub fn set(&self, value: T) -> Result<()> {
        let unchanged = (self.0.equals)(&*self.0.value.borrow(), &value);
        if unchanged {
            return Ok(());
        }

        let previous = self.0.value.replace(value);
        drop(previous);

        let core = &self.0.core;
        core.version.set(next_version(core.version.get()));
        runtime::bump_global_version();

        if !core.has_targets() {
            return Ok(());
        }

        let batch = BatchScope::start();
        links::notify_targets(core);
        batch.finish()
    }

    /// Update the value using a function of the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let next = f(&*self.0.value.borrow());
        self.set(next)
    }

    /// Number of computeds and effects currently subscribed to this signal.
    pub fn observer_count(&self) -> usize {
        links::count_targets(&self.0.core)
    }

    pub(crate) fn as_source(&self) -> Rc<dyn Source> {
        self.0.clone()
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the current value.
    ///
    /// If called within a computed or effect, this also registers the signal
    /// as one of its dependencies.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        self.with_untracked(T::clone)
    }

    /// Call `f` with the current value now and after every change.
    ///
    /// `f` itself runs untracked, so signals it reads do not become
    /// dependencies. Dispose the returned effect to stop.
    pub fn subscribe(&self, mut f: impl FnMut(&T) + 'static) -> Result<Effect> {
        let signal = self.clone();
        Effect::new(move || {
            let value = signal.get();
            untracked(|| f(&value));
        })
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Debug> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.0.core.id)
            .field("version", &self.0.core.version.get())
            .field("value", &*self.0.value.borrow())
            .finish()
    }
}

/// Create a new signal. Shorthand for [`Signal::new`].
pub fn signal<T: PartialEq + 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
