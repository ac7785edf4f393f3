//! Transport implementations and the receive loop.
//!
//! Domain code depends only on the `Transport` trait and [`Inbound`]
//! events; the in-memory transport here is the reference implementation.
//!
//! [`Inbound`]: crate::Inbound

mod memory;
pub mod runner;

pub use memory::{memory_pair, MemoryEndpoint, MemoryTransport};
