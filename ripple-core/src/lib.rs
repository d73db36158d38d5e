//! Ripple Core
//!
//! This crate provides a fine-grained reactive dependency-graph engine.
//! It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Dynamic dependency tracking with pooled, reusable graph edges
//! - Batched effect notification with runaway-update protection
//! - An optional tree of signals built from a JSON-like value
//!
//! Everything is single-threaded: each thread gets its own runtime, and the
//! handles are `!Send`.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives, evaluation context and batching
//! - `graph`: Dependency nodes, the node pool and list maintenance
//! - `tree`: Signal trees guided by a path matcher
//! - `config` / `error`: Runtime configuration and the error type
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{computed, effect, signal};
//! use std::{cell::RefCell, rc::Rc};
//!
//! // Create signals
//! let a = signal(2);
//! let b = signal(3);
//!
//! // Create a derived value
//! let product = {
//!     let (a, b) = (a.clone(), b.clone());
//!     computed(move || a.get() * b.get())
//! };
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let _effect = {
//!     let (product, log) = (product.clone(), log.clone());
//!     effect(move || -> ripple_core::Result<()> {
//!         log.borrow_mut().push(product.get()?);
//!         Ok(())
//!     })
//!     .unwrap()
//! };
//!
//! // Update a signal; the effect runs again
//! a.set(5).unwrap();
//! // Writing the same value is a no-op
//! a.set(5).unwrap();
//!
//! assert_eq!(*log.borrow(), vec![6, 15]);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod tree;

pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};
pub use reactive::{
    batch, computed, effect, signal, try_computed, untracked, Cleanup, Computed, Effect,
    ReactiveId, Runtime, Signal,
};
pub use tree::{PathMatcher, PathSegment, SignalTree};
