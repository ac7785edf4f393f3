//! Bidirectional RPC over a persistent, message-oriented connection.
//!
//! Either end of a connection can call the other. Calls are correlated by
//! sequence number, payloads use a canonical MessagePack codec, and every
//! method is declared up front in a [`Protocol`] with typed arguments and
//! return value.
//!
//! The crate does not open sockets. A connection is reached through the
//! [`Transport`] trait (send one binary message, close) and a stream of
//! [`Inbound`] events; [`memory_pair`] provides an in-process
//! implementation.
//!

// Macros first so every module below can use them.
mod macros;

pub mod codec;
mod connection_id;
mod domain;
mod error;
pub mod protocol;
mod rpc_config;
pub mod transport;
pub mod wire;

mod binder;

// --- public re-exports
pub use binder::{
    //
    Binder,
    DefaultErrorFormatter,
    ErrorFormatter,
    Facade,
    HandlerFn,
    HandlerPtr,
    HandlerRegistry,
    HandlerResult,
    Stub,
    INTERNAL_ERROR_MESSAGE,
};
pub use codec::{from_value, to_value, DecodeError, EncodeError, Key, Value};
pub use connection_id::ConnectionId;
pub use domain::{
    //
    Inbound,
    Transport,
    TransportPtr,
};
pub use error::{
    BoxError, RemoteError, Result, RpcError, CODE_INTERNAL, CODE_INVALID_ARGUMENT,
    CODE_NOT_FOUND, CODE_NOT_IMPLEMENTED,
};
pub use protocol::{
    define_method, flatten, Message, MethodDescriptor, MethodTree, Protocol, ValidationError,
    ValueType,
};
pub use rpc_config::{RpcConfig, DEFAULT_MEMORY_CAPACITY, DEFAULT_PANIC_CLOSE_CODE};
pub use transport::{memory_pair, MemoryEndpoint, MemoryTransport};
pub use wire::{MethodRunner, RunnerPtr, Wire};
