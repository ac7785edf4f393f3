use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use super::error_format::{ErrorFormatter, INTERNAL_ERROR_MESSAGE};
use super::registry::HandlerRegistry;
use crate::codec::Value;
use crate::macros::log_error;
use crate::protocol::Protocol;
use crate::wire::MethodRunner;
use crate::{RemoteError, RpcError};

/// Dispatches inbound requests to the handlers of a bound protocol.
pub(super) struct BoundRunner {
    // ---
    pub protocol: Arc<Protocol>,
    pub handlers: HandlerRegistry,
    pub formatter: Arc<dyn ErrorFormatter>,
}

#[async_trait::async_trait]
impl MethodRunner for BoundRunner {
    // ---
    async fn run_method(&self, path: &str, args: Vec<Value>) -> Result<Value, RemoteError> {
        // ---
        let method = self
            .protocol
            .flat_client()
            .get(path)
            .ok_or_else(|| RemoteError::not_found(path))?;

        method
            .validate_args(&args)
            .map_err(|err| RemoteError::invalid_argument(err.to_string()))?;

        // Omitted optional arguments reach the handler as nil.
        let mut args = args;
        args.resize(method.args().len(), Value::Nil);

        let handler = self
            .handlers
            .get(path)
            .ok_or_else(|| RemoteError::not_implemented(path))?;

        let result = match AssertUnwindSafe(handler.call(args)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                log_error!("handler for {path} failed: {err}");
                return Err(self.formatter.format_error(path, err.as_ref()));
            }
            Err(_) => {
                log_error!("handler for {path} panicked");
                return Err(RemoteError::internal(INTERNAL_ERROR_MESSAGE));
            }
        };

        if let Err(err) = method.validate_return(&result) {
            let err = RpcError::ReturnValidation(format!("{path}: {err}"));
            log_error!("{err}");
            return Err(self.formatter.format_error(path, &err));
        }
        Ok(result)
    }
}
