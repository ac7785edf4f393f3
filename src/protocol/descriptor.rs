//! Method descriptors, nested method trees and their flattened form.

use std::collections::HashMap;

use super::path::{OnExisting, PathTree};
use super::value_type::{ValidationError, ValueType};
use crate::codec::Value;
use crate::{Result, RpcError};

/// Signature of one method: ordered argument types and a return type.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    // ---
    args: Vec<ValueType>,
    returns: ValueType,
}

/// Declare a method signature. The return type comes first.
///
/// ```
/// use wire_rpc::{define_method, ValueType};
///
/// let add = define_method(ValueType::Int, [ValueType::Int, ValueType::Int]);
/// assert_eq!(add.args().len(), 2);
/// ```
pub fn define_method(
    returns: ValueType,
    args: impl IntoIterator<Item = ValueType>,
) -> MethodDescriptor {
    // ---
    MethodDescriptor {
        args: args.into_iter().collect(),
        returns,
    }
}

impl MethodDescriptor {
    // ---
    pub fn args(&self) -> &[ValueType] {
        &self.args
    }

    pub fn returns(&self) -> &ValueType {
        &self.returns
    }

    /// Check positional arguments against the declared types.
    ///
    /// Missing trailing arguments are checked as nil, so they may only be
    /// omitted when declared [`ValueType::Optional`] or [`ValueType::Any`].
    /// Surplus arguments are rejected.
    pub fn validate_args(&self, args: &[Value]) -> std::result::Result<(), ValidationError> {
        // ---
        if args.len() > self.args.len() {
            return Err(ValidationError {
                path: "args".to_string(),
                expected: format!("at most {} arguments", self.args.len()),
                found: format!("{} arguments", args.len()),
            });
        }

        for (i, ty) in self.args.iter().enumerate() {
            let arg = args.get(i).unwrap_or(&Value::Nil);
            ty.validate(arg).map_err(|mut err| {
                err.path = err.path.replacen('$', &format!("args[{i}]"), 1);
                err
            })?;
        }
        Ok(())
    }

    /// Check a result value against the declared return type.
    pub fn validate_return(&self, value: &Value) -> std::result::Result<(), ValidationError> {
        // ---
        self.returns.validate(value)
    }
}

/// One entry of a [`MethodTree`].
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEntry {
    Method(MethodDescriptor),
    Namespace(MethodTree),
}

/// Nested namespace of methods for one role.
///
/// Entries keep their declaration order; [`flatten`] reports duplicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodTree {
    // ---
    entries: Vec<(String, TreeEntry)>,
}

impl MethodTree {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method named `name`.
    pub fn method(mut self, name: impl Into<String>, descriptor: MethodDescriptor) -> Self {
        // ---
        self.entries
            .push((name.into(), TreeEntry::Method(descriptor)));
        self
    }

    /// Add a nested namespace named `name`.
    pub fn namespace(mut self, name: impl Into<String>, tree: MethodTree) -> Self {
        // ---
        self.entries.push((name.into(), TreeEntry::Namespace(tree)));
        self
    }

    pub fn entries(&self) -> &[(String, TreeEntry)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Flatten a method tree into a map from dot path to descriptor.
///
/// Each method lands at `prefix + name`; namespaces recurse with
/// `prefix + name + "."`. Two methods at one path fail with
/// [`RpcError::DuplicateMethod`], a method where a namespace already has
/// methods (or the reverse) fails with [`RpcError::PathConflict`].
pub fn flatten(tree: &MethodTree, prefix: &str) -> Result<HashMap<String, MethodDescriptor>> {
    // ---
    let mut leaves = Vec::new();
    collect_leaves(tree, prefix, &mut leaves)?;

    let mut seen = PathTree::new();
    let mut flat = HashMap::with_capacity(leaves.len());
    for (path, descriptor) in leaves {
        seen.insert(&path, (), OnExisting::Reject)?;
        flat.insert(path, descriptor.clone());
    }
    Ok(flat)
}

fn collect_leaves<'a>(
    tree: &'a MethodTree,
    prefix: &str,
    out: &mut Vec<(String, &'a MethodDescriptor)>,
) -> Result<()> {
    // ---
    for (name, entry) in &tree.entries {
        if name.is_empty() || name.contains('.') {
            return Err(RpcError::InvalidPath(format!("{prefix}{name}")));
        }
        match entry {
            TreeEntry::Method(descriptor) => out.push((format!("{prefix}{name}"), descriptor)),
            TreeEntry::Namespace(sub) => collect_leaves(sub, &format!("{prefix}{name}."), out)?,
        }
    }
    Ok(())
}

/// A two-sided RPC surface.
///
/// `server` lists the methods the server side implements (and the client
/// side calls); `client` lists the reverse. Both trees are flattened once,
/// at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Protocol {
    // ---
    server: MethodTree,
    client: MethodTree,
    flat_server: HashMap<String, MethodDescriptor>,
    flat_client: HashMap<String, MethodDescriptor>,
}

impl Protocol {
    // ---
    /// Build a protocol, failing on duplicate or conflicting paths.
    pub fn new(server: MethodTree, client: MethodTree) -> Result<Self> {
        // ---
        let flat_server = flatten(&server, "")?;
        let flat_client = flatten(&client, "")?;
        Ok(Self {
            server,
            client,
            flat_server,
            flat_client,
        })
    }

    pub fn server(&self) -> &MethodTree {
        &self.server
    }

    pub fn client(&self) -> &MethodTree {
        &self.client
    }

    /// Methods the remote server side answers, by dot path.
    pub fn flat_server(&self) -> &HashMap<String, MethodDescriptor> {
        &self.flat_server
    }

    /// Methods the local side answers, by dot path.
    pub fn flat_client(&self) -> &HashMap<String, MethodDescriptor> {
        &self.flat_client
    }

    /// The same protocol seen from the other end.
    ///
    /// A binder always calls `server` methods and answers `client` methods;
    /// the server process binds the inverted protocol.
    pub fn invert(&self) -> Self {
        // ---
        Self {
            server: self.client.clone(),
            client: self.server.clone(),
            flat_server: self.flat_client.clone(),
            flat_client: self.flat_server.clone(),
        }
    }
}
