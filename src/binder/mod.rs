//! Binding a [`Protocol`] to a connection.
//!
//! The [`Binder`] turns a protocol declaration into a [`Facade`]: one call
//! stub per method the peer answers, and a [`HandlerRegistry`] holding a
//! handler per method this side answers. Until the application installs
//! one, every declared handler answers `not_implemented`.
//!
//! # Example
//!
//! ```no_run
//! use wire_rpc::{
//!     define_method, memory_pair, BoxError, Binder, MethodTree, Protocol, RpcConfig, ValueType,
//! };
//!
//! # async fn example() -> wire_rpc::Result<()> {
//! let protocol = Protocol::new(
//!     MethodTree::new().method(
//!         "add",
//!         define_method(ValueType::Int, [ValueType::Int, ValueType::Int]),
//!     ),
//!     MethodTree::new(),
//! )?;
//!
//! let config = RpcConfig::default();
//! let (client_end, server_end) = memory_pair(&config);
//!
//! let (server, _server_task) =
//!     Binder::new(protocol.invert()).connect(server_end.transport, server_end.inbox);
//! server
//!     .handlers()
//!     .on("add", |(a, b): (i64, i64)| async move { Ok::<_, BoxError>(a + b) })?;
//!
//! let (client, _client_task) =
//!     Binder::new(protocol).connect(client_end.transport, client_end.inbox);
//! let sum: i64 = client.call("add", &(2, 3)).await?;
//! assert_eq!(sum, 5);
//! # Ok(())
//! # }
//! ```

mod error_format;
mod facade;
mod handler;
mod registry;
mod runner;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::macros::log_error;
use crate::protocol::Protocol;
use crate::transport::runner as receive_loop;
use crate::wire::Wire;
use crate::{Inbound, RpcConfig, TransportPtr};

pub use error_format::{DefaultErrorFormatter, ErrorFormatter, INTERNAL_ERROR_MESSAGE};
pub use facade::{Facade, Stub};
pub use handler::{HandlerFn, HandlerPtr, HandlerResult};
pub use registry::HandlerRegistry;

use runner::BoundRunner;

/// Builds [`Facade`]s for one protocol.
///
/// The binder always calls the protocol's `server` methods and answers its
/// `client` methods; bind [`Protocol::invert`] for the serving side.
#[derive(Clone)]
pub struct Binder {
    // ---
    protocol: Arc<Protocol>,
    config: RpcConfig,
    formatter: Option<Arc<dyn ErrorFormatter>>,
}

impl Binder {
    // ---
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol: Arc::new(protocol),
            config: RpcConfig::default(),
            formatter: None,
        }
    }

    pub fn config(mut self, config: RpcConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default error formatter.
    pub fn error_formatter(mut self, formatter: impl ErrorFormatter + 'static) -> Self {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// Bind to a transport.
    ///
    /// The caller feeds inbound events to [`Facade::wire`], usually through
    /// [`transport::runner`](crate::transport::runner).
    pub fn bind(&self, transport: TransportPtr) -> Facade {
        // ---
        let placeholders = HandlerRegistry::with_placeholders(self.protocol.flat_client().keys());
        let handlers = match placeholders {
            Ok(handlers) => handlers,
            Err(err) => {
                // Unreachable: flattened paths never conflict.
                log_error!("failed to install placeholder handlers: {err}");
                HandlerRegistry::new()
            }
        };

        let formatter: Arc<dyn ErrorFormatter> = match &self.formatter {
            Some(formatter) => formatter.clone(),
            None => Arc::new(DefaultErrorFormatter {
                expose_internal_errors: self.config.expose_internal_errors,
            }),
        };

        let runner = BoundRunner {
            protocol: self.protocol.clone(),
            handlers: handlers.clone(),
            formatter,
        };
        let wire = Wire::new(transport, Arc::new(runner), self.config.clone());

        Facade::new(wire, self.protocol.clone(), handlers)
    }

    /// Bind to a transport and spawn the receive loop over `inbox`.
    pub fn connect(
        &self,
        transport: TransportPtr,
        inbox: mpsc::Receiver<Inbound>,
    ) -> (Facade, JoinHandle<()>) {
        // ---
        let facade = self.bind(transport);
        let task = receive_loop::spawn(facade.wire().clone(), inbox);
        (facade, task)
    }
}
