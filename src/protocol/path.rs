//! Dot-separated method paths and the namespace tree they address.

use std::collections::BTreeMap;

use crate::{Result, RpcError};

/// Split a dot path (`"math.vec.add"`) into its segments.
///
/// Empty paths and empty segments (`"a..b"`, `".a"`, `"a."`) are rejected.
pub fn split_path(path: &str) -> Result<Vec<&str>> {
    // ---
    if path.is_empty() {
        return Err(RpcError::InvalidPath(path.to_string()));
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(RpcError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// What to do when a leaf already exists at the target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnExisting {
    /// Report [`RpcError::DuplicateMethod`].
    Reject,
    /// Swap the new value in.
    Replace,
}

enum Node<T> {
    Leaf(T),
    Namespace(BTreeMap<String, Node<T>>),
}

/// A tree of namespaces with values at the leaves.
///
/// A path is either a leaf or a namespace, never both: inserting `a` while
/// `a.b` exists (or the reverse) fails with [`RpcError::PathConflict`].
/// Intermediate namespaces are created on demand.
pub(crate) struct PathTree<T> {
    root: BTreeMap<String, Node<T>>,
}

impl<T> PathTree<T> {
    // ---
    pub fn new() -> Self {
        Self {
            root: BTreeMap::new(),
        }
    }

    /// Insert `value` at `path`. Returns the replaced value, if any.
    pub fn insert(&mut self, path: &str, value: T, on_existing: OnExisting) -> Result<Option<T>> {
        // ---
        let segments = split_path(path)?;
        let (last, parents) = match segments.split_last() {
            Some(split) => split,
            None => return Err(RpcError::InvalidPath(path.to_string())),
        };

        let mut level = &mut self.root;
        for (depth, segment) in parents.iter().enumerate() {
            let node = level
                .entry((*segment).to_string())
                .or_insert_with(|| Node::Namespace(BTreeMap::new()));
            level = match node {
                Node::Namespace(children) => children,
                Node::Leaf(_) => {
                    let taken = segments[..=depth].join(".");
                    return Err(RpcError::PathConflict(format!(
                        "{path} would nest under method {taken}"
                    )));
                }
            };
        }

        match level.get_mut(*last) {
            None => {
                level.insert((*last).to_string(), Node::Leaf(value));
                Ok(None)
            }
            Some(Node::Namespace(_)) => Err(RpcError::PathConflict(format!(
                "{path} is already a namespace"
            ))),
            Some(Node::Leaf(existing)) => match on_existing {
                OnExisting::Reject => Err(RpcError::DuplicateMethod(path.to_string())),
                OnExisting::Replace => Ok(Some(std::mem::replace(existing, value))),
            },
        }
    }

    /// All leaf paths, in sorted order.
    pub fn paths(&self) -> Vec<String> {
        // ---
        let mut out = Vec::new();
        collect_paths(&self.root, "", &mut out);
        out
    }
}

impl<T> Default for PathTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_paths<T>(level: &BTreeMap<String, Node<T>>, prefix: &str, out: &mut Vec<String>) {
    for (name, node) in level {
        let full = format!("{prefix}{name}");
        match node {
            Node::Leaf(_) => out.push(full),
            Node::Namespace(children) => collect_paths(children, &format!("{full}."), out),
        }
    }
}
