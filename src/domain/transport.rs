//! Transport domain abstractions.
//!
//! The engine talks to a connection through two outbound operations (send
//! one binary message, close the connection) and consumes a stream of
//! [`Inbound`] events. Nothing here refers to sockets, TLS or reconnection;
//! those stay with the concrete transport.
//!
//! The in-memory transport under `src/transport/` is the reference
//! implementation of these semantics.

use std::sync::Arc;

use bytes::Bytes;

use crate::Result;

/// An event delivered by a transport, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    // ---
    /// One complete binary message.
    Binary(Bytes),

    /// One complete text message. The protocol only speaks binary, so this
    /// is a framing fault.
    Text(String),

    /// The connection is gone. No further events follow.
    Closed { code: u16, reason: String },
}

/// Transport abstraction.
///
/// Implementations must ensure that:
/// - each `send` delivers exactly one message, boundaries preserved
/// - messages sent from one task arrive in send order
/// - `close` is safe to call more than once
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Send one binary message to the peer.
    async fn send(&self, payload: Bytes) -> Result<()>;

    /// Close the connection with a close code and a human-readable reason.
    async fn close(&self, code: u16, reason: &str);
}

/// Shared transport pointer.
///
/// `.clone()` only bumps a reference count; every clone drives the same
/// connection.
pub type TransportPtr = Arc<dyn Transport>;
