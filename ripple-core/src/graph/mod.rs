//! Dependency Graph
//!
//! This module implements the edges of the dependency graph that tracks
//! relationships between reactive values and computations.
//!
//! # Overview
//!
//! The graph is distributed: there is no central adjacency map. Each edge is
//! a [`DependencyNode`](node::DependencyNode) that sits in two doubly linked
//! lists at once, the dependency list of its target and the observer list of
//! its source.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a pooled arena and link to each other by [`NodeId`], so
//!    cyclic list structure needs no reference cycles.
//!
//! 2. Dependency lists are kept in access order. The first changed dependency
//!    is enough to decide that a derivation must re-run.
//!
//! 3. Edges are reused across evaluations instead of rebuilt, so a stable
//!    derivation re-runs without touching the allocator.

pub(crate) mod links;
mod node;
mod pool;

pub use node::{NodeId, NOT_USED};
pub(crate) use node::next_version;
pub(crate) use pool::NodePool;
