//! Transport receive loop.
//!
//! Glue between a transport's inbound event stream and a [`Wire`]. The
//! loop hands events to the wire one at a time, in arrival order, and
//! stops after the connection closes.
//!
//! ## Design notes
//!
//! ### Explicit execution
//!
//! Nothing is processed until [`run`] is awaited or [`spawn`] is called.
//! [`Binder::connect`](crate::Binder::connect) does the latter.
//!
//! ### Termination
//!
//! The loop exits on [`Inbound::Closed`] or when the event channel ends.
//! Either way the wire is marked closed, so calls still waiting fail with
//! `RpcError::ConnectionClosed`.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::macros::log_debug;
use crate::wire::Wire;
use crate::Inbound;

/// Drive `wire` from `inbox` until the connection closes.
pub async fn run(wire: Wire, mut inbox: mpsc::Receiver<Inbound>) {
    // ---
    while let Some(event) = inbox.recv().await {
        let closing = matches!(event, Inbound::Closed { .. });
        wire.dispatch(event).await;
        if closing {
            break;
        }
    }

    // No-op when the close event already arrived.
    wire.handle_closed();
    log_debug!("receive loop for wire {} stopped", wire.id());
}

/// Spawn [`run`] on the current tokio runtime.
///
/// Dropping the returned handle does not stop the loop.
pub fn spawn(wire: Wire, inbox: mpsc::Receiver<Inbound>) -> JoinHandle<()> {
    // ---
    tokio::spawn(run(wire, inbox))
}

#[cfg(test)]
mod tests {
    // ---
    use crate::Transport;
    use super::*;
    use crate::codec::Value;
    use crate::protocol::Message;
    use crate::wire::MethodRunner;
    use crate::{memory_pair, RemoteError, RpcConfig, RpcError};
    use std::sync::Arc;
    use tokio::time::{timeout, Duration};

    struct Nobody;

    #[async_trait::async_trait]
    impl MethodRunner for Nobody {
        async fn run_method(&self, path: &str, _args: Vec<Value>) -> Result<Value, RemoteError> {
            Err(RemoteError::not_found(path))
        }
    }

    #[tokio::test]
    async fn loop_stops_on_close_and_fails_pending() {
        // ---
        let (a, mut b) = memory_pair(&RpcConfig::default());
        let wire = Wire::new(a.transport.clone(), Arc::new(Nobody), RpcConfig::default());
        let task = spawn(wire.clone(), a.inbox);

        let call = tokio::spawn({
            let wire = wire.clone();
            async move { wire.call("anything", vec![]).await }
        });
        assert!(matches!(b.inbox.recv().await, Some(Inbound::Binary(_))));

        b.transport.close(1001, "going away").await;
        task.await.unwrap();

        assert!(wire.is_closed());
        assert_eq!(call.await.unwrap(), Err(RpcError::ConnectionClosed));
    }

    #[tokio::test]
    async fn peer_close_behind_a_full_inbox_fails_pending() {
        // ---
        let config = RpcConfig::default().with_memory_capacity(1);
        let (mut a, b) = memory_pair(&config);
        let wire = Wire::new(b.transport.clone(), Arc::new(Nobody), config);

        let call = tokio::spawn({
            let wire = wire.clone();
            async move { wire.call("anything", vec![]).await }
        });
        assert!(matches!(a.inbox.recv().await, Some(Inbound::Binary(_))));

        // Occupy b's only inbox slot, then close from a.
        let stray = Message::Success {
            seq: 999,
            result: Value::Nil,
        };
        a.transport.send(stray.encode().unwrap()).await.unwrap();
        a.transport.close(1000, "bye").await;

        timeout(Duration::from_secs(1), run(wire.clone(), b.inbox))
            .await
            .expect("receive loop should stop");
        assert!(wire.is_closed());
        assert_eq!(call.await.unwrap(), Err(RpcError::ConnectionClosed));
    }

    #[tokio::test]
    async fn dropped_channel_closes_the_wire() {
        // ---
        let (tx, rx) = mpsc::channel(1);
        let (a, _b) = memory_pair(&RpcConfig::default());
        let wire = Wire::new(a.transport, Arc::new(Nobody), RpcConfig::default());

        drop(tx);
        run(wire.clone(), rx).await;
        assert!(wire.is_closed());
    }
}
