use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::codec::Value;
use crate::{Result, RpcError};

/// Tracks outbound calls waiting for responses.
///
/// Maps each call's `seq` to the oneshot channel its caller awaits. Every
/// entry leaves the map exactly once: on its response, when the connection
/// closes, or when its call ends without one.
pub(super) struct PendingCalls {
    // ---
    calls: HashMap<u64, oneshot::Sender<Result<Value>>>,
}

impl PendingCalls {
    // ---
    pub fn new() -> Self {
        // ---
        Self {
            calls: HashMap::new(),
        }
    }

    /// Register a call and return the receiver its caller awaits.
    pub fn register(&mut self, seq: u64) -> oneshot::Receiver<Result<Value>> {
        // ---
        let (tx, rx) = oneshot::channel();
        self.calls.insert(seq, tx);
        rx
    }

    /// Deliver the outcome of call `seq`.
    ///
    /// Returns false when no call with that `seq` is pending.
    pub fn complete(&mut self, seq: u64, outcome: Result<Value>) -> bool {
        // ---
        if let Some(tx) = self.calls.remove(&seq) {
            // The caller may have stopped waiting.
            let _ = tx.send(outcome);
            true
        } else {
            false
        }
    }

    /// Drop call `seq` without delivering anything.
    pub fn remove(&mut self, seq: u64) -> bool {
        // ---
        self.calls.remove(&seq).is_some()
    }

    /// Fail every pending call with [`RpcError::ConnectionClosed`].
    ///
    /// Returns how many calls were failed.
    pub fn fail_all(&mut self) -> usize {
        // ---
        let count = self.calls.len();
        for (_, tx) in self.calls.drain() {
            let _ = tx.send(Err(RpcError::ConnectionClosed));
        }
        count
    }

    pub fn len(&self) -> usize {
        // ---
        self.calls.len()
    }
}
