//! Error types for the reactive runtime.
//!
//! Every fallible operation in the crate returns [`Result`]. The error type is
//! cheap to clone because a failed derivation stores its error and hands a
//! copy back on every read until it recomputes successfully.

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use thiserror::Error;

use crate::reactive::ReactiveId;

pub type Result<T> = std::result::Result<T, ReactiveError>;

#[derive(Debug, Clone, Error)]
pub enum ReactiveError {
    /// A computed was read while it was deriving, or an effect re-entered
    /// itself.
    #[error("cycle detected while evaluating {id}")]
    Cycle { id: ReactiveId },

    /// The batch flush ran more passes than the configured limit, which
    /// almost always means an effect chain keeps re-triggering itself.
    #[error("batch exceeded {limit} flush passes; likely an infinite effect chain")]
    RunawayUpdate { limit: u32 },

    /// An error returned by user code (a derivation, effect or cleanup).
    #[error("{0}")]
    User(Rc<dyn StdError>),

    /// A plain message returned by user code.
    #[error("{0}")]
    Message(Rc<str>),

    /// More than one effect failed during a single flush.
    #[error("{} errors during batch flush: {}", .0.len(), DisplayList(.0))]
    Multiple(Vec<ReactiveError>),

    /// A signal-tree path that does not address any node.
    #[error("no node at path `{path}`")]
    InvalidPath { path: String },

    #[error("invalid runtime config: {0}")]
    Config(String),
}

impl ReactiveError {
    /// Wrap an arbitrary error produced by user code.
    pub fn user<E>(err: E) -> Self
    where
        E: StdError + 'static,
    {
        Self::User(Rc::new(err))
    }

    /// Build an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(Rc::from(message.into()))
    }

    /// Whether this is a cycle error.
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }

    /// The individual errors carried by this error (one, unless `Multiple`).
    pub fn errors(&self) -> &[ReactiveError] {
        match self {
            Self::Multiple(errors) => errors,
            other => std::slice::from_ref(other),
        }
    }

    /// Merge two failures into one `Multiple`.
    pub(crate) fn combine(self, other: ReactiveError) -> Self {
        let mut errors = ErrorSet::new();
        errors.push(self);
        errors.push(other);
        Self::Multiple(errors.errors.into_vec())
    }
}

struct DisplayList<'a>(&'a [ReactiveError]);

impl fmt::Display for DisplayList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Collects errors while a flush keeps going, then folds them into a single
/// result: nothing, the one error as-is, or `Multiple`.
#[derive(Default)]
pub(crate) struct ErrorSet {
    errors: SmallVec<[ReactiveError; 2]>,
}

impl ErrorSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, err: ReactiveError) {
        match err {
            ReactiveError::Multiple(errors) => self.errors.extend(errors),
            err => self.errors.push(err),
        }
    }

    pub(crate) fn capture<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.push(err);
                None
            }
        }
    }

    pub(crate) fn into_result(mut self) -> Result<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(ReactiveError::Multiple(self.errors.into_vec())),
        }
    }
}
