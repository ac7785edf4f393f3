//! In-memory transport implementation.
//!
//! A connected pair of endpoints built from tokio channels. It is the
//! reference implementation of the domain-level `Transport` trait and is
//! used by tests and local wiring.
//!
//! ## Reference Semantics
//!
//! - Each `send` arrives on the peer's inbox as one [`Inbound::Binary`]
//!   event, in send order.
//! - `close` marks both ends closed and queues [`Inbound::Closed`] on each
//!   inbox that has room. Every inbox ends (`recv` returns `None`) after
//!   its queued events, so a close is never lost. Later sends fail with
//!   `RpcError::Send`.
//! - No messages are dropped due to timing or scheduling.
//!
//! ## Non-Goals
//!
//! Network behavior, partial failures and reconnection are not emulated.
//!
//! [`Inbound::Binary`]: crate::Inbound::Binary
//! [`Inbound::Closed`]: crate::Inbound::Closed

mod transport;

pub use transport::{memory_pair, MemoryEndpoint, MemoryTransport};
