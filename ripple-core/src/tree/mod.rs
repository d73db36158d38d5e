//! Signal Trees
//!
//! A [`SignalTree`] turns a plain nested value into a tree of signals so
//! that readers are only notified about the parts they actually read.
//!
//! # Structure
//!
//! Each node of the tree is one of:
//!
//! - a **leaf**: a `Signal<Value>` holding a scalar, or a whole container
//!   that the [`PathMatcher`] chose not to expand
//! - an **object** or **array** node: one child node per key or index
//!
//! Every node also carries a `shape` signal that changes when its keys,
//! length or kind change, so a reader that walks through a node notices
//! structural changes without subscribing to every child.
//!
//! # Writes
//!
//! [`SignalTree::set`] reconciles the new value against the existing nodes
//! inside one batch. Leaves whose values are equal stay untouched and notify
//! nobody.

mod path;

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{ReactiveError, Result};
use crate::reactive::{batch, Signal};

pub use path::{format_path, MatchAll, MaxDepth, PathMatcher, PathSegment};

enum NodeKind {
    Leaf(Signal<Value>),
    Object(IndexMap<String, Rc<TreeNode>>),
    Array(Vec<Rc<TreeNode>>),
}

struct TreeNode {
    shape: Signal<u64>,
    kind: RefCell<NodeKind>,
}

impl TreeNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            shape: Signal::new(0),
            kind: RefCell::new(kind),
        }
    }

    fn reshaped(&self) -> Result<()> {
        self.shape.update(|v| v.wrapping_add(1))
    }

    fn child(&self, segment: &PathSegment) -> Option<Rc<TreeNode>> {
        match (&*self.kind.borrow(), segment) {
            (NodeKind::Object(children), PathSegment::Key(key)) => children.get(key).cloned(),
            (NodeKind::Array(children), PathSegment::Index(index)) => children.get(*index).cloned(),
            _ => None,
        }
    }

    fn leaf(&self) -> Option<Signal<Value>> {
        match &*self.kind.borrow() {
            NodeKind::Leaf(signal) => Some(signal.clone()),
            _ => None,
        }
    }

    /// Tracked snapshot of this subtree.
    fn to_value(&self) -> Value {
        self.shape.get();
        match &*self.kind.borrow() {
            NodeKind::Leaf(signal) => signal.get(),
            NodeKind::Object(children) => Value::Object(
                children
                    .iter()
                    .map(|(key, child)| (key.clone(), child.to_value()))
                    .collect(),
            ),
            NodeKind::Array(children) => {
                Value::Array(children.iter().map(|child| child.to_value()).collect())
            }
        }
    }
}

/// A tree of signals mirroring a JSON value.
///
/// # Example
///
/// ```rust
/// use ripple_core::{effect, SignalTree};
/// use serde_json::json;
/// use std::{cell::Cell, rc::Rc};
///
/// let tree = SignalTree::new(json!({ "user": { "name": "ada", "age": 36 } }));
/// let runs = Rc::new(Cell::new(0));
///
/// let _e = {
///     let (tree, runs) = (tree.clone(), runs.clone());
///     effect(move || {
///         tree.get(&["user".into(), "name".into()]);
///         runs.set(runs.get() + 1);
///     })
///     .unwrap()
/// };
///
/// // A sibling changes: the effect does not re-run.
/// tree.set(&["user".into(), "age".into()], json!(37)).unwrap();
/// assert_eq!(runs.get(), 1);
///
/// tree.set(&["user".into(), "name".into()], json!("grace")).unwrap();
/// assert_eq!(runs.get(), 2);
/// ```
#[derive(Clone)]
pub struct SignalTree {
    root: Rc<TreeNode>,
    matcher: Rc<dyn PathMatcher>,
}

impl SignalTree {
    /// Build a tree that expands every object and array.
    pub fn new(value: Value) -> Self {
        Self::with_matcher(value, MatchAll)
    }

    /// Build a tree that expands a container only where `matcher` accepts
    /// its path. The matcher is consulted for the root too.
    pub fn with_matcher(value: Value, matcher: impl PathMatcher + 'static) -> Self {
        let matcher: Rc<dyn PathMatcher> = Rc::new(matcher);
        let root = Rc::new(build(&*matcher, value, &mut Vec::new()));
        Self { root, matcher }
    }

    /// Read the value at `path`, tracking it.
    ///
    /// A path that reaches inside an unexpanded container reads that
    /// container's signal and navigates into its value.
    pub fn get(&self, path: &[PathSegment]) -> Option<Value> {
        let mut node = Rc::clone(&self.root);
        for (depth, segment) in path.iter().enumerate() {
            node.shape.get();
            if let Some(signal) = node.leaf() {
                return signal.with(|value| navigate(value, &path[depth..]).cloned());
            }
            node = node.child(segment)?;
        }
        Some(node.to_value())
    }

    /// The signal stored at exactly `path`, if that node is a leaf.
    pub fn leaf(&self, path: &[PathSegment]) -> Option<Signal<Value>> {
        self.node(path)?.leaf()
    }

    /// Write `value` at `path`.
    ///
    /// An expanded subtree is reconciled so that only leaves whose values
    /// differ notify. A missing final object key is inserted and an array
    /// index equal to the length appends; any other missing segment fails
    /// with [`ReactiveError::InvalidPath`].
    pub fn set(&self, path: &[PathSegment], value: Value) -> Result<()> {
        batch(|| {
            let mut node = Rc::clone(&self.root);
            for (depth, segment) in path.iter().enumerate() {
                if let Some(signal) = node.leaf() {
                    let mut whole = signal.peek();
                    write_into(&mut whole, &path[depth..], value)
                        .map_err(|()| invalid_path(path))?;
                    return signal.set(whole);
                }

                match node.child(segment) {
                    Some(child) => node = child,
                    None if depth + 1 == path.len() => {
                        return self.insert(&node, segment, value, path);
                    }
                    None => return Err(invalid_path(path)),
                }
            }
            self.reconcile(&node, value, &mut path.to_vec())
        })
    }

    /// Replace the whole tree's value.
    pub fn replace(&self, value: Value) -> Result<()> {
        self.set(&[], value)
    }

    /// Tracked snapshot of the whole tree.
    pub fn to_value(&self) -> Value {
        self.root.to_value()
    }

    fn node(&self, path: &[PathSegment]) -> Option<Rc<TreeNode>> {
        path.iter()
            .try_fold(Rc::clone(&self.root), |node, segment| node.child(segment))
    }

    fn insert(
        &self,
        parent: &TreeNode,
        segment: &PathSegment,
        value: Value,
        path: &[PathSegment],
    ) -> Result<()> {
        let mut child_path = path.to_vec();
        {
            let mut kind = parent.kind.borrow_mut();
            match (&mut *kind, segment) {
                (NodeKind::Object(children), PathSegment::Key(key)) => {
                    let child = build(&*self.matcher, value, &mut child_path);
                    children.insert(key.clone(), Rc::new(child));
                }
                (NodeKind::Array(children), PathSegment::Index(index)) if *index == children.len() => {
                    let child = build(&*self.matcher, value, &mut child_path);
                    children.push(Rc::new(child));
                }
                _ => return Err(invalid_path(path)),
            };
        }
        parent.reshaped()
    }

    fn reconcile(&self, node: &TreeNode, value: Value, path: &mut Vec<PathSegment>) -> Result<()> {
        let expand = is_container(&value) && self.matcher.matches(path);
        let mut kind = node.kind.borrow_mut();
        let value = match (&mut *kind, value) {
            (NodeKind::Leaf(signal), value) if !expand => return signal.set(value),
            (NodeKind::Object(children), Value::Object(incoming)) if expand => {
                let before = children.len();
                children.retain(|key, _| incoming.contains_key(key));
                let mut reshaped = children.len() != before;

                for (key, value) in incoming {
                    path.push(PathSegment::Key(key.clone()));
                    match children.get(&key).cloned() {
                        Some(child) => self.reconcile(&child, value, path)?,
                        None => {
                            let child = build(&*self.matcher, value, path);
                            children.insert(key, Rc::new(child));
                            reshaped = true;
                        }
                    }
                    path.pop();
                }
                return if reshaped { node.reshaped() } else { Ok(()) };
            }
            (NodeKind::Array(children), Value::Array(incoming)) if expand => {
                let reshaped = children.len() != incoming.len();
                children.truncate(incoming.len());

                for (index, value) in incoming.into_iter().enumerate() {
                    path.push(PathSegment::Index(index));
                    match children.get(index).cloned() {
                        Some(child) => self.reconcile(&child, value, path)?,
                        None => children.push(Rc::new(build(&*self.matcher, value, path))),
                    }
                    path.pop();
                }
                return if reshaped { node.reshaped() } else { Ok(()) };
            }
            (_, value) => value,
        };
        drop(kind);

        // The node changes kind: rebuild it in place.
        let rebuilt = build(&*self.matcher, value, path);
        let previous = node.kind.replace(rebuilt.kind.into_inner());
        drop(previous);
        node.reshaped()
    }
}

impl std::fmt::Debug for SignalTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalTree")
            .field("value", &crate::untracked(|| self.to_value()))
            .finish()
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn invalid_path(path: &[PathSegment]) -> ReactiveError {
    ReactiveError::InvalidPath {
        path: format_path(path),
    }
}

fn build(matcher: &dyn PathMatcher, value: Value, path: &mut Vec<PathSegment>) -> TreeNode {
    let kind = match value {
        Value::Object(map) if matcher.matches(path) => {
            let mut children = IndexMap::with_capacity(map.len());
            for (key, value) in map {
                path.push(PathSegment::Key(key.clone()));
                children.insert(key, Rc::new(build(matcher, value, path)));
                path.pop();
            }
            NodeKind::Object(children)
        }
        Value::Array(items) if matcher.matches(path) => {
            let mut children = Vec::with_capacity(items.len());
            for (index, value) in items.into_iter().enumerate() {
                path.push(PathSegment::Index(index));
                children.push(Rc::new(build(matcher, value, path)));
                path.pop();
            }
            NodeKind::Array(children)
        }
        value => NodeKind::Leaf(Signal::new(value)),
    };
    TreeNode::new(kind)
}

fn navigate<'a>(value: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(value, |value, segment| match (value, segment) {
        (Value::Object(map), PathSegment::Key(key)) => map.get(key),
        (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
        _ => None,
    })
}

/// Write `new` at `path` inside a plain value, with the same insert and
/// append rules as [`SignalTree::set`].
fn write_into(value: &mut Value, path: &[PathSegment], new: Value) -> std::result::Result<(), ()> {
    let Some((last, parents)) = path.split_last() else {
        *value = new;
        return Ok(());
    };

    let mut target = value;
    for segment in parents {
        target = match (target, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key).ok_or(())?,
            (Value::Array(items), PathSegment::Index(index)) => items.get_mut(*index).ok_or(())?,
            _ => return Err(()),
        };
    }

    match (target, last) {
        (Value::Object(map), PathSegment::Key(key)) => {
            map.insert(key.clone(), new);
        }
        (Value::Array(items), PathSegment::Index(index)) if *index == items.len() => items.push(new),
        (Value::Array(items), PathSegment::Index(index)) => {
            *items.get_mut(*index).ok_or(())? = new;
        }
        _ => return Err(()),
    }
    Ok(())
}
