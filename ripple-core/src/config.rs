//! Runtime Configuration
//!
//! Tunables for the per-thread reactive runtime. A configuration is applied
//! with [`Runtime::configure`](crate::reactive::Runtime::configure) and stays
//! in effect for the current thread until replaced.
//!
//! Configurations can also be loaded from JSON; missing fields fall back to
//! their defaults:
//!
//! ```rust
//! use ripple_core::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_json(r#"{ "max_batch_iterations": 50 }"#).unwrap();
//! assert_eq!(config.max_batch_iterations, 50);
//! assert_eq!(config.node_pool_capacity, RuntimeConfig::default().node_pool_capacity);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// Default number of flush passes a single batch may run.
pub const DEFAULT_MAX_BATCH_ITERATIONS: u32 = 100;

/// Default number of free dependency-node slots the pool retains.
pub const DEFAULT_NODE_POOL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Flush passes allowed per outermost batch before the batch is abandoned
    /// with [`ReactiveError::RunawayUpdate`].
    pub max_batch_iterations: u32,

    /// Free dependency-node slots kept for reuse. Released slots beyond this
    /// are trimmed from the end of the arena, or otherwise left unused until
    /// the arena shrinks past them.
    pub node_pool_capacity: usize,

    /// Record every signal, computed and effect in the debug registry.
    pub debug_registry: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_batch_iterations: DEFAULT_MAX_BATCH_ITERATIONS,
            node_pool_capacity: DEFAULT_NODE_POOL_CAPACITY,
            debug_registry: cfg!(debug_assertions),
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ReactiveError::Config(e.to_string()))
    }

    pub fn with_max_batch_iterations(mut self, limit: u32) -> Self {
        self.max_batch_iterations = limit;
        self
    }

    pub fn with_node_pool_capacity(mut self, capacity: usize) -> Self {
        self.node_pool_capacity = capacity;
        self
    }

    pub fn with_debug_registry(mut self, enabled: bool) -> Self {
        self.debug_registry = enabled;
        self
    }
}
