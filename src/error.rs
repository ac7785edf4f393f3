use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{DecodeError, EncodeError};

/// Error code sent when an inbound path is absent from the local dispatch table.
pub const CODE_NOT_FOUND: &str = "not_found";

/// Error code sent when inbound arguments fail their declared types.
pub const CODE_INVALID_ARGUMENT: &str = "invalid_argument";

/// Error code sent when a declared method has no handler installed.
pub const CODE_NOT_IMPLEMENTED: &str = "not_implemented";

/// Error code sent for handler failures and invalid handler results.
pub const CODE_INTERNAL: &str = "internal";

/// Boxed error type returned by inbound method handlers.
///
/// Handlers may return any error; returning a [`RemoteError`] lets the
/// handler pick the `{code, message}` pair the caller receives.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The `{code, message}` pair carried by an error response.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct RemoteError {
    // ---
    /// Machine-readable error code (e.g. `"not_found"`, `"internal"`).
    pub code: String,

    /// Human-readable error description.
    pub message: String,
}

impl RemoteError {
    // ---
    /// Build a remote error from a code and a message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// `not_found` error for an unknown method path.
    pub fn not_found(path: &str) -> Self {
        Self::new(CODE_NOT_FOUND, format!("Method Not Found: {path}"))
    }

    /// `invalid_argument` error with validation details.
    pub fn invalid_argument(details: impl Into<String>) -> Self {
        Self::new(CODE_INVALID_ARGUMENT, details)
    }

    /// `not_implemented` error for a declared method with no handler.
    pub fn not_implemented(path: &str) -> Self {
        Self::new(CODE_NOT_IMPLEMENTED, format!("Method Not Implemented: {path}"))
    }

    /// Generic `internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CODE_INTERNAL, message)
    }
}

/// Errors that can occur during RPC operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    /// Inbound bytes could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// An outbound value could not be encoded
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// A value could not be converted to or from its Rust type
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A decoded message was neither a request nor a response
    #[error("unrecognized message shape")]
    UnrecognizedMessage,

    /// The method path is not declared by the protocol
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// An outbound argument failed its declared type; nothing was sent
    #[error("argument validation failed: {0}")]
    ArgumentValidation(String),

    /// A call result failed the declared return type
    #[error("return value validation failed: {0}")]
    ReturnValidation(String),

    /// The peer answered with an error response
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// The connection closed before a response arrived
    #[error("connection closed")]
    ConnectionClosed,

    /// The transport rejected an outbound message
    #[error("send failed: {0}")]
    Send(String),

    /// A method or namespace collides with an existing path
    #[error("path conflict: {0}")]
    PathConflict(String),

    /// Two methods were declared at the same path
    #[error("duplicate method definition: {0}")]
    DuplicateMethod(String),

    /// A path or path segment is empty or malformed
    #[error("invalid path: {0:?}")]
    InvalidPath(String),
}

impl RpcError {
    // ---
    /// Returns the remote `{code, message}` pair if this is a remote error.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            RpcError::Remote(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RemoteError> for RpcError {
    fn from(err: RemoteError) -> Self {
        RpcError::Remote(err)
    }
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn remote_error_display_includes_code() {
        // ---
        let err = RpcError::from(RemoteError::not_found("math.add"));
        assert_eq!(
            err.to_string(),
            "remote error: not_found: Method Not Found: math.add"
        );
        assert_eq!(err.remote().map(|e| e.code.as_str()), Some(CODE_NOT_FOUND));
    }

    #[test]
    fn remote_error_survives_boxing() {
        // ---
        let boxed: BoxError = RemoteError::new("quota", "too many").into();
        let back = boxed.downcast_ref::<RemoteError>();
        assert_eq!(back, Some(&RemoteError::new("quota", "too many")));
    }
}
