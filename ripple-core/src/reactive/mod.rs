//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects. These primitives form the foundation of Ripple's fine-grained
//! reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (a computed or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when it is read after one of its dependencies changed. Computeds are useful
//! for expensive derivations that should not be repeated unnecessarily.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! the outside world, such as logging or updating a view.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local evaluation context to detect
//! dependencies automatically. When a signal is read, we check if there is an
//! active context and, if so, link the signal into its dependency list.
//!
//! Propagation is push-then-pull: a write pushes "outdated" marks forward
//! through observer lists and queues effects, and each computed pulls fresh
//! values on demand when read. Version numbers on every source let a reader
//! skip work when nothing it depends on actually changed.

mod batch;
mod computed;
pub(crate) mod context;
mod effect;
pub(crate) mod runtime;
mod signal;
mod subscriber;

pub use batch::batch;
pub use computed::{computed, try_computed, Computed};
pub use context::untracked;
pub use effect::{effect, Cleanup, Effect, EffectReturn};
pub use runtime::{DebugEntry, Runtime, RuntimeStats};
pub use signal::{signal, Signal};
pub use subscriber::{ReactiveId, ReactiveKind};

pub(crate) use effect::EffectInner;
pub(crate) use subscriber::{Flags, Source, SourceCore, Target, TargetCore};
