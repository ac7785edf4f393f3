use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::registry::HandlerRegistry;
use crate::codec::{from_value, to_args, Value};
use crate::protocol::{MethodDescriptor, Protocol};
use crate::wire::Wire;
use crate::{Result, RpcError};

/// A protocol bound to one connection.
///
/// Calls go out through [`Facade::stub`] or [`Facade::call`]; inbound
/// requests are answered by the handlers in [`Facade::handlers`]. One stub
/// per remote method is built when the facade is created.
///
/// Cheap to clone (internally `Arc`-backed).
#[derive(Clone)]
pub struct Facade {
    // ---
    wire: Wire,
    protocol: Arc<Protocol>,
    handlers: HandlerRegistry,
    stubs: Arc<HashMap<String, Stub>>,
}

impl Facade {
    // ---
    pub(super) fn new(wire: Wire, protocol: Arc<Protocol>, handlers: HandlerRegistry) -> Self {
        // ---
        let stubs = protocol
            .flat_server()
            .iter()
            .map(|(path, method)| {
                let stub = Stub {
                    path: path.clone(),
                    method: method.clone(),
                    wire: wire.clone(),
                };
                (path.clone(), stub)
            })
            .collect();

        Self {
            wire,
            protocol,
            handlers,
            stubs: Arc::new(stubs),
        }
    }

    pub fn wire(&self) -> &Wire {
        &self.wire
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Handlers answering the peer's calls.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Call stub for a method the peer answers.
    ///
    /// # Errors
    ///
    /// `RpcError::MethodNotFound` if the protocol declares no such method.
    pub fn stub(&self, path: &str) -> Result<&Stub> {
        self.stubs
            .get(path)
            .ok_or_else(|| RpcError::MethodNotFound(path.to_string()))
    }

    /// Every stub, keyed by dot path.
    pub fn stubs(&self) -> &HashMap<String, Stub> {
        &self.stubs
    }

    /// Shortcut for `self.stub(path)?.call(args)`.
    pub async fn call<A, R>(&self, path: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        // ---
        self.stub(path)?.call(args).await
    }
}

/// Typed entry point for one remote method.
#[derive(Clone)]
pub struct Stub {
    // ---
    path: String,
    method: MethodDescriptor,
    wire: Wire,
}

impl Stub {
    // ---
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Call with positional values.
    ///
    /// Arguments are checked before anything is sent; the result is checked
    /// against the declared return type.
    ///
    /// # Errors
    ///
    /// - `RpcError::ArgumentValidation` - an argument fails its declared type
    /// - `RpcError::ReturnValidation` - the peer's result fails the return type
    /// - anything [`Wire::call`] returns
    pub async fn call_values(&self, args: Vec<Value>) -> Result<Value> {
        // ---
        self.method
            .validate_args(&args)
            .map_err(|err| RpcError::ArgumentValidation(format!("{}: {err}", self.path)))?;

        let result = self.wire.call(&self.path, args).await?;

        self.method
            .validate_return(&result)
            .map_err(|err| RpcError::ReturnValidation(format!("{}: {err}", self.path)))?;
        Ok(result)
    }

    /// Call with arguments given as a tuple and convert the result.
    ///
    /// `(a, b)` passes two arguments, `(a,)` one and `()` none.
    pub async fn call<A, R>(&self, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        // ---
        let result = self.call_values(to_args(args)?).await?;
        from_value(&result)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::binder::Binder;
    use crate::protocol::{define_method, MethodTree, ValueType};
    use crate::{memory_pair, RpcConfig};

    fn facade() -> Facade {
        // ---
        let server = MethodTree::new()
            .method("ping", define_method(ValueType::Nil, []))
            .namespace(
                "math",
                MethodTree::new().method(
                    "add",
                    define_method(ValueType::Int, [ValueType::Int, ValueType::Int]),
                ),
            );
        let protocol = Protocol::new(server, MethodTree::new()).unwrap();
        let (a, _b) = memory_pair(&RpcConfig::default());
        Binder::new(protocol).bind(a.transport)
    }

    #[tokio::test]
    async fn stub_table_covers_every_remote_method() {
        // ---
        let facade = facade();

        let mut paths: Vec<&str> = facade.stubs().keys().map(String::as_str).collect();
        paths.sort_unstable();
        assert_eq!(paths, vec!["math.add", "ping"]);

        let add = facade.stub("math.add").unwrap();
        assert_eq!(add.path(), "math.add");
        assert_eq!(add.descriptor().args().len(), 2);
    }

    #[tokio::test]
    async fn stubs_are_built_once() {
        // ---
        let facade = facade();
        let clone = facade.clone();

        assert!(std::ptr::eq(
            facade.stub("ping").unwrap(),
            clone.stub("ping").unwrap()
        ));
        assert!(matches!(
            facade.stub("math"),
            Err(RpcError::MethodNotFound(path)) if path == "math"
        ));
    }
}
