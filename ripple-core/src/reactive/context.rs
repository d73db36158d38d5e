//! Evaluation Context
//!
//! The evaluation context names the computed or effect that is currently
//! running. When a signal is read, it registers itself as a dependency of
//! that context.
//!
//! # Implementation
//!
//! A single thread-local slot holds the current context. Entering a context
//! (running a computed or effect, or [`untracked`]) swaps the slot and returns
//! a guard that puts the previous value back when dropped. Nested evaluations
//! therefore form an implicit stack, and the slot is restored on every exit
//! path, including early returns and unwinding.

use std::cell::RefCell;
use std::rc::Rc;

use super::subscriber::Target;

thread_local! {
    static EVAL_CONTEXT: RefCell<Option<Rc<dyn Target>>> = const { RefCell::new(None) };
}

/// Guard that restores the previous evaluation context when dropped.
pub(crate) struct EvalScope {
    previous: Option<Rc<dyn Target>>,
}

impl EvalScope {
    /// Make `target` the current context (or clear it with `None`).
    pub(crate) fn enter(target: Option<Rc<dyn Target>>) -> Self {
        let previous = EVAL_CONTEXT.with(|slot| slot.replace(target));
        Self { previous }
    }
}

impl Drop for EvalScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // During thread teardown the slot may already be gone.
        let replaced = EVAL_CONTEXT.try_with(|slot| slot.replace(previous));
        drop(replaced);
    }
}

/// The target currently being evaluated, if any.
pub(crate) fn current() -> Option<Rc<dyn Target>> {
    EVAL_CONTEXT.with(|slot| slot.borrow().clone())
}

/// Check if a computed or effect is currently evaluating.
pub(crate) fn is_active() -> bool {
    EVAL_CONTEXT.with(|slot| slot.borrow().is_some())
}

/// Run `f` without recording any dependency, even if it reads signals.
///
/// ```rust
/// use ripple_core::{computed, signal, untracked};
///
/// let a = signal(1);
/// let b = signal(10);
/// let sum = {
///     let (a, b) = (a.clone(), b.clone());
///     computed(move || a.get() + untracked(|| b.get()))
/// };
/// assert_eq!(sum.get().unwrap(), 11);
///
/// // `b` was read untracked, so writing it does not invalidate `sum`.
/// b.set(20).unwrap();
/// assert_eq!(sum.get().unwrap(), 11);
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _scope = EvalScope::enter(None);
    f()
}
