use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::handler::{not_implemented, raw_handler, typed_handler, HandlerPtr, HandlerResult};
use crate::codec::Value;
use crate::error::BoxError;
use crate::protocol::{OnExisting, PathTree};
use crate::Result;

/// Writable namespace of inbound handlers, addressed by dot path.
///
/// Intermediate namespaces are created on demand. Installing a handler at a
/// path that already holds one replaces it; a handler at `a` while `a.b`
/// exists (or the reverse) fails with [`RpcError::PathConflict`].
///
/// Cheap to clone; clones share the same handlers.
///
/// [`RpcError::PathConflict`]: crate::RpcError::PathConflict
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    inner: Arc<RwLock<Handlers>>,
}

/// The namespace tree guards path shape; lookups go through `by_path`.
#[derive(Default)]
struct Handlers {
    tree: PathTree<()>,
    by_path: HashMap<String, HandlerPtr>,
}

impl HandlerRegistry {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the not-implemented placeholder at every path.
    pub(crate) fn with_placeholders<'a>(
        paths: impl IntoIterator<Item = &'a String>,
    ) -> Result<Self> {
        // ---
        let registry = Self::new();
        for path in paths {
            registry.insert(path, not_implemented(path))?;
        }
        Ok(registry)
    }

    /// Install a handler taking raw positional values.
    ///
    /// ```
    /// use wire_rpc::{HandlerRegistry, Value};
    ///
    /// let handlers = HandlerRegistry::new();
    /// handlers
    ///     .register("debug.count", |args: Vec<Value>| async move {
    ///         Ok(Value::Int(args.len() as i64))
    ///     })
    ///     .unwrap();
    /// ```
    pub fn register<F, Fut>(&self, path: &str, handler: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        // ---
        self.insert(path, raw_handler(handler))
    }

    /// Install a handler taking its arguments as one tuple.
    ///
    /// ```
    /// use wire_rpc::{BoxError, HandlerRegistry};
    ///
    /// let handlers = HandlerRegistry::new();
    /// handlers
    ///     .on("math.add", |(a, b): (i64, i64)| async move { Ok::<_, BoxError>(a + b) })
    ///     .unwrap();
    /// ```
    pub fn on<F, Fut, A, R>(&self, path: &str, handler: F) -> Result<()>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, BoxError>> + Send + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
    {
        // ---
        self.insert(path, typed_handler(handler))
    }

    /// Install an already type-erased handler.
    pub fn insert(&self, path: &str, handler: HandlerPtr) -> Result<()> {
        // ---
        let mut handlers = self.write();
        handlers.tree.insert(path, (), OnExisting::Replace)?;
        handlers.by_path.insert(path.to_string(), handler);
        Ok(())
    }

    /// Handler currently installed at `path`.
    pub fn get(&self, path: &str) -> Option<HandlerPtr> {
        self.read().by_path.get(path).cloned()
    }

    /// Every path with a handler, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.read().tree.paths()
    }

    fn read(&self) -> RwLockReadGuard<'_, Handlers> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Handlers> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
