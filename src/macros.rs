//
// Logging macros used by the wire engine and binder.
//
// `logging` feature enabled  → tracing events and spans
// `logging` feature disabled → errors go to stderr, everything else is
//                              type-checked and discarded
//

#![allow(unused_macros)]

#[cfg(feature = "logging")]
macro_rules! log_error {
    ($($arg:tt)*) => {
        tracing::error!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*)
    };
}

#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        tracing::warn!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        let _ = format_args!($($arg)*);
    }};
}

#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        let _ = format_args!($($arg)*);
    }};
}

// Wrap a future in a per-connection span so every event emitted while
// handling one inbound frame carries the connection id and label.
#[cfg(feature = "logging")]
macro_rules! in_connection_span {
    ($conn:expr, $label:expr, $fut:expr) => {{
        use tracing::Instrument as _;
        ($fut).instrument(tracing::debug_span!("wire", conn = %$conn, label = %$label))
    }};
}

#[cfg(not(feature = "logging"))]
macro_rules! in_connection_span {
    ($conn:expr, $label:expr, $fut:expr) => {{
        let _ = (&$conn, &$label);
        $fut
    }};
}

pub(crate) use in_connection_span;
pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_warn;
