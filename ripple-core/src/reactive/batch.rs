//! Batch Scheduler
//!
//! Writes do not run effects directly. A notified effect is pushed onto an
//! intrusive queue, and the queue is drained when the outermost batch closes.
//! Every write to an observed signal opens its own batch, so a lone write
//! flushes immediately while writes inside [`batch`] are coalesced.
//!
//! # Draining
//!
//! A drain runs in passes. Each pass takes the whole queue, and effects that
//! get notified while it runs land in a fresh queue for the next pass. For
//! each effect:
//!
//! 1. Clear its NOTIFIED flag so it can be queued again.
//! 2. Skip it if it is disposed, or if none of its sources actually changed
//!    (a computed in between may have recomputed to the same value).
//! 3. Run it, collecting any error instead of stopping the drain.
//!
//! The number of passes per outermost batch is capped. Exceeding the cap
//! abandons all pending effects and fails with
//! [`ReactiveError::RunawayUpdate`].

use std::rc::Rc;

use super::effect::EffectInner;
use super::runtime::with_runtime;
use super::subscriber::Flags;
use crate::error::{ErrorSet, ReactiveError, Result};
use crate::graph::links;

/// An open batch. Closing it with [`finish`](Self::finish) drains the queue
/// if this was the outermost batch; dropping it without finishing (an unwind
/// through user code) only closes it.
pub(crate) struct BatchScope {
    open: bool,
}

impl BatchScope {
    pub(crate) fn start() -> Self {
        with_runtime(|rt| rt.batch_depth.set(rt.batch_depth.get() + 1));
        Self { open: true }
    }

    pub(crate) fn finish(mut self) -> Result<()> {
        self.open = false;
        end_batch()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        if self.open {
            super::runtime::leave_batch();
        }
    }
}

fn end_batch() -> Result<()> {
    let depth = with_runtime(|rt| rt.batch_depth.get());
    if depth > 1 {
        with_runtime(|rt| rt.batch_depth.set(depth - 1));
        return Ok(());
    }

    let limit = with_runtime(|rt| rt.config.get().max_batch_iterations);
    let mut errors = ErrorSet::new();
    let mut passes = 0u32;

    while let Some(head) = with_runtime(|rt| rt.batched_effect.take()) {
        let iteration = with_runtime(|rt| {
            let iteration = rt.batch_iteration.get() + 1;
            rt.batch_iteration.set(iteration);
            iteration
        });
        if iteration > limit {
            tracing::warn!(limit, "batch exceeded its flush pass limit; abandoning pending effects");
            abandon(Some(head));
            errors.push(ReactiveError::RunawayUpdate { limit });
            break;
        }
        passes += 1;

        let mut cursor = Some(head);
        while let Some(effect) = cursor {
            cursor = effect.next_batched.take();
            effect.target.remove(Flags::NOTIFIED);

            if !effect.target.has(Flags::DISPOSED) && links::needs_to_recompute(&effect.target) {
                if let Err(err) = effect.run() {
                    tracing::debug!(id = %effect.id(), error = %err, "effect failed during flush");
                    errors.push(err);
                }
            }
        }
    }

    with_runtime(|rt| {
        rt.batch_iteration.set(0);
        rt.batch_depth.set(rt.batch_depth.get().saturating_sub(1));
    });
    if passes > 0 {
        tracing::trace!(passes, "flushed batched effects");
    }

    errors.into_result()
}

/// Drop every queued effect without running it.
///
/// Computeds between a write and a dropped effect were notified but will
/// never be refreshed by it, so their marks are cleared as well. Otherwise
/// later writes would stop at them.
fn abandon(mut cursor: Option<Rc<EffectInner>>) {
    loop {
        while let Some(effect) = cursor {
            cursor = effect.next_batched.take();
            effect.target.remove(Flags::NOTIFIED);
            links::reset_notified_sources(&effect.target);
        }
        cursor = with_runtime(|rt| rt.batched_effect.take());
        if cursor.is_none() {
            break;
        }
    }
}

/// Run `f` with effect notifications deferred until it returns.
///
/// Nested calls only run `f`; the outermost call flushes every effect
/// notified inside it, each at most once. Effect errors are collected during
/// the flush and returned afterwards (aggregated if there are several). If `f`
/// itself fails, the flush still happens and its errors are added to `f`'s.
///
/// ```rust
/// use ripple_core::{batch, effect, signal};
/// use std::{cell::Cell, rc::Rc};
///
/// let x = signal(0);
/// let y = signal(0);
/// let runs = Rc::new(Cell::new(0));
///
/// let _e = {
///     let (x, y, runs) = (x.clone(), y.clone(), runs.clone());
///     effect(move || {
///         x.get();
///         y.get();
///         runs.set(runs.get() + 1);
///     })
///     .unwrap()
/// };
///
/// batch(|| {
///     x.set(1)?;
///     y.set(2)?;
///     Ok(())
/// })
/// .unwrap();
///
/// assert_eq!(runs.get(), 2);
/// ```
pub fn batch<R>(f: impl FnOnce() -> Result<R>) -> Result<R> {
    if with_runtime(|rt| rt.batch_depth.get() > 0) {
        return f();
    }

    let scope = BatchScope::start();
    let result = f();
    let flushed = scope.finish();

    match (result, flushed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(flush_err)) => Err(err.combine(flush_err)),
    }
}
