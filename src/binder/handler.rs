use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{from_args, to_value, Value};
use crate::error::{BoxError, RemoteError};

/// What an inbound handler resolves to.
pub type HandlerResult = std::result::Result<Value, BoxError>;

/// Type-erased inbound method handler.
///
/// Arguments arrive already validated against the method's declared types.
pub trait HandlerFn: Send + Sync {
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, HandlerResult>;
}

/// Shared handler pointer stored in the registry.
pub type HandlerPtr = Arc<dyn HandlerFn>;

// Handler working on raw positional values.
struct RawHandler<F> {
    func: F,
}

impl<F, Fut> HandlerFn for RawHandler<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.func)(args))
    }
}

// Handler taking its arguments as one deserializable tuple.
struct TypedHandler<F, Fut, A, R> {
    func: F,
    _phantom: PhantomData<fn(A, R, Fut)>,
}

impl<F, Fut, A, R> HandlerFn for TypedHandler<F, Fut, A, R>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, BoxError>> + Send + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn call(&self, args: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        // ---
        let args: A = match from_args(args) {
            Ok(args) => args,
            Err(err) => {
                let err: BoxError = RemoteError::invalid_argument(err.to_string()).into();
                return Box::pin(async move { Err(err) });
            }
        };

        let fut = (self.func)(args);
        Box::pin(async move {
            let out = fut.await?;
            to_value(&out).map_err(BoxError::from)
        })
    }
}

// Installed for every declared method until the application replaces it.
struct NotImplemented {
    path: String,
}

impl HandlerFn for NotImplemented {
    fn call(&self, _args: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        let err: BoxError = RemoteError::not_implemented(&self.path).into();
        Box::pin(async move { Err(err) })
    }
}

pub(crate) fn raw_handler<F, Fut>(func: F) -> HandlerPtr
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(RawHandler { func })
}

pub(crate) fn typed_handler<F, Fut, A, R>(func: F) -> HandlerPtr
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, BoxError>> + Send + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    Arc::new(TypedHandler {
        func,
        _phantom: PhantomData,
    })
}

pub(crate) fn not_implemented(path: &str) -> HandlerPtr {
    Arc::new(NotImplemented {
        path: path.to_string(),
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn remote(err: BoxError) -> RemoteError {
        err.downcast_ref::<RemoteError>().cloned().unwrap()
    }

    #[tokio::test]
    async fn typed_handler_converts_both_ways() {
        // ---
        let add = typed_handler(|(a, b): (i64, i64)| async move { Ok::<_, BoxError>(a + b) });
        let out = add.call(vec![Value::Int(2), Value::Int(3)]).await.unwrap();
        assert_eq!(out, Value::Int(5));
    }

    #[tokio::test]
    async fn typed_handler_rejects_unconvertible_args() {
        // ---
        let add = typed_handler(|(a, b): (i64, i64)| async move { Ok::<_, BoxError>(a + b) });
        let err = add.call(vec![Value::from("x")]).await.unwrap_err();
        assert_eq!(remote(err).code, crate::error::CODE_INVALID_ARGUMENT);
    }

    #[tokio::test]
    async fn raw_handler_sees_positional_values() {
        // ---
        let count =
            raw_handler(|args: Vec<Value>| async move { Ok(Value::Int(args.len() as i64)) });
        let out = count.call(vec![Value::Nil, Value::Nil]).await.unwrap();
        assert_eq!(out, Value::Int(2));
    }

    #[tokio::test]
    async fn placeholder_reports_not_implemented() {
        // ---
        let err = not_implemented("events.push").call(vec![]).await.unwrap_err();
        assert_eq!(remote(err), RemoteError::not_implemented("events.push"));
    }
}
