use std::error::Error as StdError;

use crate::error::RemoteError;

/// Message sent for failures whose details stay local.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Error";

/// Shapes a handler failure into the `{code, message}` pair sent to the peer.
///
/// Closures of the form `Fn(&str, &(dyn Error + 'static)) -> RemoteError`
/// implement this trait; the first argument is the method path.
pub trait ErrorFormatter: Send + Sync {
    fn format_error(&self, path: &str, error: &(dyn StdError + 'static)) -> RemoteError;
}

impl<F> ErrorFormatter for F
where
    F: Fn(&str, &(dyn StdError + 'static)) -> RemoteError + Send + Sync,
{
    fn format_error(&self, path: &str, error: &(dyn StdError + 'static)) -> RemoteError {
        self(path, error)
    }
}

/// Formatter used unless the binder is given another one.
///
/// A [`RemoteError`] returned by a handler passes through unchanged.
/// Anything else becomes `internal` with the message `"Internal Error"`,
/// or with the error's own text when `expose_internal_errors` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorFormatter {
    pub expose_internal_errors: bool,
}

impl ErrorFormatter for DefaultErrorFormatter {
    fn format_error(&self, _path: &str, error: &(dyn StdError + 'static)) -> RemoteError {
        // ---
        if let Some(remote) = error.downcast_ref::<RemoteError>() {
            return remote.clone();
        }
        if self.expose_internal_errors {
            RemoteError::internal(error.to_string())
        } else {
            RemoteError::internal(INTERNAL_ERROR_MESSAGE)
        }
    }
}
