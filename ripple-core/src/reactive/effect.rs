//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued on the current batch
//!    and re-runs when the outermost batch closes, at most once per flush.
//!
//! 3. Before re-running, the effect marks its old dependencies as unused and
//!    drops the ones the new run does not read again.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - Computeds cache results; effects just run their side effect.
//!
//! # Cleanup
//!
//! Effects can optionally return a [`Cleanup`]. It runs before the effect
//! re-runs and when the effect is disposed, outside any tracking context.
//!
//! # Lifetime
//!
//! A live effect is owned by the runtime, not by its handle. Dropping an
//! [`Effect`] handle does not stop it; call [`Effect::dispose`]. An error
//! from the callback or a cleanup disposes the effect.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::batch::BatchScope;
use super::context::EvalScope;
use super::runtime::{self, with_runtime};
use super::subscriber::{Flags, ReactiveId, ReactiveKind, Target, TargetCore};
use super::untracked;
use crate::error::{ErrorSet, ReactiveError, Result};
use crate::graph::links;

/// Teardown work returned by an effect callback.
pub struct Cleanup(Box<dyn FnOnce() -> Result<()>>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(move || {
            f();
            Ok(())
        }))
    }

    /// A cleanup that may fail. A failure disposes the effect.
    pub fn try_new(f: impl FnOnce() -> Result<()> + 'static) -> Self {
        Self(Box::new(f))
    }

    fn run(self) -> Result<()> {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values an effect callback may return.
pub trait EffectReturn {
    fn into_outcome(self) -> Result<Option<Cleanup>>;
}

impl EffectReturn for () {
    fn into_outcome(self) -> Result<Option<Cleanup>> {
        Ok(None)
    }
}

impl EffectReturn for Cleanup {
    fn into_outcome(self) -> Result<Option<Cleanup>> {
        Ok(Some(self))
    }
}

impl EffectReturn for Option<Cleanup> {
    fn into_outcome(self) -> Result<Option<Cleanup>> {
        Ok(self)
    }
}

impl EffectReturn for Result<()> {
    fn into_outcome(self) -> Result<Option<Cleanup>> {
        self.map(|()| None)
    }
}

impl EffectReturn for Result<Cleanup> {
    fn into_outcome(self) -> Result<Option<Cleanup>> {
        self.map(Some)
    }
}

impl EffectReturn for Result<Option<Cleanup>> {
    fn into_outcome(self) -> Result<Option<Cleanup>> {
        self
    }
}

type Callback = Box<dyn FnMut() -> Result<Option<Cleanup>>>;

pub(crate) struct EffectInner {
    pub(crate) target: TargetCore,
    callback: RefCell<Option<Callback>>,
    cleanup: RefCell<Option<Cleanup>>,
    /// Next effect in the batch queue while this one is queued.
    pub(crate) next_batched: RefCell<Option<Rc<EffectInner>>>,
    runs: Cell<usize>,
    weak_self: Weak<EffectInner>,
}

impl EffectInner {
    pub(crate) fn id(&self) -> ReactiveId {
        self.target.id
    }

    /// Run the callback, tracking what it reads.
    pub(crate) fn run(self: &Rc<Self>) -> Result<()> {
        let target = &self.target;
        if target.has(Flags::RUNNING) {
            return Err(ReactiveError::Cycle { id: self.id() });
        }
        if target.has(Flags::DISPOSED) {
            return Ok(());
        }

        target.insert(Flags::RUNNING);
        self.run_cleanup()?;
        links::prepare_sources(target);
        let batch = BatchScope::start();
        let mut errors = ErrorSet::new();

        let callback = self.callback.take();
        let outcome = match callback {
            Some(mut callback) => {
                let outcome = {
                    let this: Rc<dyn Target> = self.clone();
                    let _scope = EvalScope::enter(Some(this));
                    callback()
                };
                if !target.has(Flags::DISPOSED) {
                    *self.callback.borrow_mut() = Some(callback);
                }
                outcome
            }
            None => Ok(None),
        };

        links::cleanup_sources(target);
        target.remove(Flags::RUNNING);
        self.runs.set(self.runs.get() + 1);

        match outcome {
            Ok(cleanup) => {
                let previous = self.cleanup.replace(cleanup);
                drop(previous);
            }
            Err(err) => {
                target.insert(Flags::DISPOSED);
                errors.push(err);
            }
        }
        if target.has(Flags::DISPOSED) {
            errors.capture(self.teardown());
        }

        errors.capture(batch.finish());
        errors.into_result()
    }

    /// Run the pending cleanup, if any. A failing cleanup disposes the effect.
    fn run_cleanup(&self) -> Result<()> {
        let Some(cleanup) = self.cleanup.take() else {
            return Ok(());
        };

        let batch = BatchScope::start();
        let mut errors = ErrorSet::new();
        if let Err(err) = untracked(|| cleanup.run()) {
            errors.push(err);
            self.target.remove(Flags::RUNNING);
            if !self.target.has(Flags::DISPOSED) {
                self.target.insert(Flags::DISPOSED);
                errors.capture(self.teardown());
            }
        }
        errors.capture(batch.finish());
        errors.into_result()
    }

    fn teardown(&self) -> Result<()> {
        links::release_sources(&self.target, true);
        let callback = self.callback.take();
        drop(callback);

        runtime::release_effect(self.id());
        runtime::unregister(self.id());
        tracing::debug!(id = %self.id(), runs = self.runs.get(), "effect disposed");

        self.run_cleanup()
    }

    pub(crate) fn dispose(&self) -> Result<()> {
        if self.target.has(Flags::DISPOSED) {
            return Ok(());
        }
        self.target.insert(Flags::DISPOSED);
        // Disposed from inside its own callback: `run` finishes the job.
        if self.target.has(Flags::RUNNING) {
            return Ok(());
        }
        self.teardown()
    }
}

impl Target for EffectInner {
    fn target_core(&self) -> &TargetCore {
        &self.target
    }

    fn notify(&self) {
        if self.target.has(Flags::NOTIFIED) {
            return;
        }
        let Some(this) = self.weak_self.upgrade() else {
            return;
        };
        self.target.insert(Flags::NOTIFIED);
        with_runtime(|rt| {
            let head = rt.batched_effect.take();
            *self.next_batched.borrow_mut() = head;
            *rt.batched_effect.borrow_mut() = Some(this);
        });
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Effect, Signal};
/// use std::{cell::RefCell, rc::Rc};
///
/// let count = Signal::new(0);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let effect = {
///     let (count, log) = (count.clone(), log.clone());
///     Effect::new(move || log.borrow_mut().push(count.get())).unwrap()
/// };
///
/// count.set(5).unwrap();
/// assert_eq!(*log.borrow(), vec![0, 5]);
///
/// effect.dispose().unwrap();
/// count.set(6).unwrap();
/// assert_eq!(*log.borrow(), vec![0, 5]);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies. If
    /// that first run fails, the effect is disposed and the error returned.
    pub fn new<F, R>(mut f: F) -> Result<Self>
    where
        F: FnMut() -> R + 'static,
        R: EffectReturn,
    {
        let id = ReactiveId::new();
        let callback: Callback = Box::new(move || f().into_outcome());
        let inner = Rc::new_cyclic(|weak_self| EffectInner {
            target: TargetCore::new(id, Flags::TRACKING),
            callback: RefCell::new(Some(callback)),
            cleanup: RefCell::new(None),
            next_batched: RefCell::new(None),
            runs: Cell::new(0),
            weak_self: weak_self.clone(),
        });

        runtime::retain_effect(Rc::clone(&inner));
        runtime::register(id, ReactiveKind::Effect);

        if let Err(err) = inner.run() {
            return Err(match inner.dispose() {
                Ok(()) => err,
                Err(dispose_err) => err.combine(dispose_err),
            });
        }
        Ok(Self { inner })
    }

    pub fn id(&self) -> ReactiveId {
        self.inner.id()
    }

    /// Stop the effect: unsubscribe it, drop its callback and run its pending
    /// cleanup. Calling it again does nothing.
    pub fn dispose(&self) -> Result<()> {
        self.inner.dispose()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.target.has(Flags::DISPOSED)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    /// Get the number of dependencies read by the last run.
    pub fn dependency_count(&self) -> usize {
        links::count_sources(&self.inner.target)
    }

    pub(crate) fn inner(&self) -> Rc<EffectInner> {
        Rc::clone(&self.inner)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create and run an effect. Shorthand for [`Effect::new`].
pub fn effect<F, R>(f: F) -> Result<Effect>
where
    F: FnMut() -> R + 'static,
    R: EffectReturn,
{
    Effect::new(f)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Runtime, Signal};

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Rc::new(Cell::new(0));
        let effect = {
            let run_count = run_count.clone();
            Effect::new(move || run_count.set(run_count.get() + 1)).unwrap()
        };

        assert_eq!(run_count.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_a_dependency_changes() {
        let signal = Signal::new(0);
        let effect = {
            let signal = signal.clone();
            Effect::new(move || {
                signal.get();
            })
            .unwrap()
        };
        assert_eq!(effect.dependency_count(), 1);

        signal.set(1).unwrap();
        signal.set(2).unwrap();
        assert_eq!(effect.run_count(), 3);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let signal = Signal::new(0);
        let effect = {
            let signal = signal.clone();
            Effect::new(move || {
                signal.get();
            })
            .unwrap()
        };

        effect.dispose().unwrap();
        assert!(effect.is_disposed());
        assert_eq!(signal.observer_count(), 0);

        signal.set(1).unwrap();
        assert_eq!(effect.run_count(), 1);

        // Idempotent.
        effect.dispose().unwrap();
    }

    #[test]
    fn dropping_the_handle_keeps_the_effect_alive() {
        let signal = Signal::new(0);
        let runs = Rc::new(Cell::new(0));
        let effect = {
            let (signal, runs) = (signal.clone(), runs.clone());
            Effect::new(move || {
                signal.get();
                runs.set(runs.get() + 1);
            })
            .unwrap()
        };
        let live = Runtime::stats().live_effects;
        drop(effect);

        signal.set(1).unwrap();
        assert_eq!(runs.get(), 2);
        assert_eq!(Runtime::stats().live_effects, live);
    }

    #[test]
    fn cleanup_runs_before_rerun_and_on_dispose() {
        let signal = Signal::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let effect = {
            let (signal, log) = (signal.clone(), log.clone());
            Effect::new(move || {
                let value = signal.get();
                log.borrow_mut().push(format!("run {value}"));
                let log = log.clone();
                Cleanup::new(move || log.borrow_mut().push(format!("cleanup {value}")))
            })
            .unwrap()
        };

        signal.set(1).unwrap();
        effect.dispose().unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["run 0", "cleanup 0", "run 1", "cleanup 1"]
        );
    }

    #[test]
    fn callback_error_disposes_the_effect() {
        let signal = Signal::new(0);
        let effect = {
            let signal = signal.clone();
            Effect::new(move || -> Result<()> {
                if signal.get() > 0 {
                    return Err(ReactiveError::msg("too big"));
                }
                Ok(())
            })
            .unwrap()
        };

        let err = signal.set(1).unwrap_err();
        assert!(matches!(err, ReactiveError::Message(m) if &*m == "too big"));
        assert!(effect.is_disposed());
        assert_eq!(signal.observer_count(), 0);
    }

    #[test]
    fn failing_first_run_is_returned() {
        let result = Effect::new(|| -> Result<()> { Err(ReactiveError::msg("nope")) });
        assert!(matches!(result, Err(ReactiveError::Message(_))));
    }

    #[test]
    fn cleanup_error_disposes_the_effect() {
        let signal = Signal::new(0);
        let effect = {
            let signal = signal.clone();
            Effect::new(move || {
                signal.get();
                Cleanup::try_new(|| Err(ReactiveError::msg("cleanup failed")))
            })
            .unwrap()
        };

        let err = signal.set(1).unwrap_err();
        assert!(matches!(err, ReactiveError::Message(m) if &*m == "cleanup failed"));
        assert!(effect.is_disposed());
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn dispose_inside_callback_is_deferred() {
        let signal = Signal::new(0);
        let slot: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));
        let runs = Rc::new(Cell::new(0));

        let effect = {
            let (signal, slot, runs) = (signal.clone(), slot.clone(), runs.clone());
            Effect::new(move || -> Result<()> {
                runs.set(runs.get() + 1);
                if signal.get() > 0 {
                    if let Some(me) = slot.borrow().as_ref() {
                        me.dispose()?;
                    }
                }
                Ok(())
            })
            .unwrap()
        };
        *slot.borrow_mut() = Some(effect.clone());

        signal.set(1).unwrap();
        assert!(effect.is_disposed());
        assert_eq!(runs.get(), 2);

        signal.set(2).unwrap();
        assert_eq!(runs.get(), 2);
        slot.borrow_mut().take();
    }

    #[test]
    fn writes_inside_an_effect_are_batched() {
        let source = Signal::new(0);
        let a = Signal::new(0);
        let b = Signal::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _writer = {
            let (source, a, b) = (source.clone(), a.clone(), b.clone());
            Effect::new(move || -> Result<()> {
                let v = source.get();
                a.set(v)?;
                b.set(v * 10)
            })
            .unwrap()
        };
        let _reader = {
            let (a, b, seen) = (a.clone(), b.clone(), seen.clone());
            Effect::new(move || seen.borrow_mut().push((a.get(), b.get()))).unwrap()
        };

        source.set(2).unwrap();
        assert_eq!(*seen.borrow(), vec![(0, 0), (2, 20)]);
    }
}
