//! Domain layer public interface.
//!
//! Abstractions that are independent of any concrete transport. Domain
//! consumers import symbols via this module, not from individual files.

mod transport;

// --- Transport domain re-exports ---

pub use transport::{
    //
    Inbound,
    Transport,
    TransportPtr,
};
