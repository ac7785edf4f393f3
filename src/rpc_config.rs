//! Public, transport-agnostic RPC configuration.
//!
//! Everything here tunes the engine and binder; concrete transports read
//! only the fields that concern them (the in-memory transport reads
//! `memory_capacity`).

/// Default close code sent when a connection is torn down by a protocol fault.
pub const DEFAULT_PANIC_CLOSE_CODE: u16 = 4033;

/// Default buffer size of each direction of the in-memory transport.
pub const DEFAULT_MEMORY_CAPACITY: usize = 64;

/// Engine and binder configuration.
///
/// # Example
///
/// ```
/// use wire_rpc::RpcConfig;
///
/// let config = RpcConfig::new("billing-client")
///     .with_panic_close_code(4000)
///     .with_expose_internal_errors(true);
/// assert_eq!(config.panic_close_code, 4000);
/// ```
#[derive(Debug, Clone)]
pub struct RpcConfig {
    // ---
    /// Free-form name attached to log spans next to the connection id.
    pub label: String,

    /// Close code passed to the transport when the engine panics.
    ///
    /// Should stay within the private range 4000-4999.
    pub panic_close_code: u16,

    /// Send handler error text to the peer instead of `"Internal Error"`.
    ///
    /// Only affects the default error formatter.
    pub expose_internal_errors: bool,

    /// Channel capacity of each in-memory transport direction.
    pub memory_capacity: usize,
}

impl RpcConfig {
    /// Create a config with the given label and default settings.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Set the close code used on protocol faults.
    pub fn with_panic_close_code(mut self, code: u16) -> Self {
        self.panic_close_code = code;
        self
    }

    pub fn with_expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    /// Set the in-memory transport channel capacity (minimum 1).
    pub fn with_memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = capacity.max(1);
        self
    }
}

impl Default for RpcConfig {
    /// - `label`: `"wire"`
    /// - `panic_close_code`: 4033
    /// - `expose_internal_errors`: false
    /// - `memory_capacity`: 64
    fn default() -> Self {
        Self {
            label: "wire".to_string(),
            panic_close_code: DEFAULT_PANIC_CLOSE_CODE,
            expose_internal_errors: false,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}
