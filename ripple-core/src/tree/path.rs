//! Paths into a signal tree and the predicate that decides which of them get
//! their own signals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of a path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, ".{key}"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Render a path as `$.key[0].other`. The root is `$`.
pub fn format_path(path: &[PathSegment]) -> String {
    let mut out = String::from("$");
    for segment in path {
        out.push_str(&segment.to_string());
    }
    out
}

/// Decides whether the container at a path is split into per-child signals.
///
/// Containers the matcher rejects are stored whole in a single signal, so
/// any change inside them notifies everything that reads them.
pub trait PathMatcher {
    fn matches(&self, path: &[PathSegment]) -> bool;
}

impl<F> PathMatcher for F
where
    F: Fn(&[PathSegment]) -> bool,
{
    fn matches(&self, path: &[PathSegment]) -> bool {
        self(path)
    }
}

/// Expands every container.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl PathMatcher for MatchAll {
    fn matches(&self, _path: &[PathSegment]) -> bool {
        true
    }
}

/// Expands containers no deeper than `max_depth` segments below the root.
#[derive(Debug, Clone, Copy)]
pub struct MaxDepth(pub usize);

impl PathMatcher for MaxDepth {
    fn matches(&self, path: &[PathSegment]) -> bool {
        path.len() <= self.0
    }
}
