//! Per-connection protocol engine.
//!
//! A [`Wire`] owns the state of one connection: the sequence counter for
//! outbound calls, the table of calls awaiting a response, and the one-shot
//! closed flag. It encodes outgoing [`Message`]s, classifies incoming ones
//! and hands inbound requests to a [`MethodRunner`].
//!
//! # Faults
//!
//! Only framing faults are fatal. A frame that is not binary, does not
//! decode, or is neither a request nor a response makes the wire *panic*:
//! it fails every pending call and asks the transport to close with code
//! 4033 (configurable) and a reason string. Errors inside a method call are
//! answered with an error response and leave the connection up.
//!
//! # Concurrency
//!
//! Any number of calls may be in flight; responses resolve by `seq` in
//! whatever order they arrive. Inbound requests run in their own tasks, so
//! a slow handler never delays response handling. The state mutex is never
//! held across an `.await`.

mod pending;

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::codec::{self, Value};
use crate::macros::{in_connection_span, log_debug, log_error, log_warn};
use crate::protocol::Message;
use crate::{ConnectionId, Inbound, RemoteError, Result, RpcConfig, RpcError, TransportPtr};

use pending::PendingCalls;

/// Panic reason for a text frame.
pub const REASON_NON_BINARY: &str = "Non-binary message received";

/// Panic reason for a frame that fails to decode.
pub const REASON_UNDECODABLE: &str = "Cannot decode the message";

/// Panic reason for a decoded frame that is neither request nor response.
pub const REASON_INVALID_MESSAGE: &str = "Invalid message received";

/// Executes inbound requests.
///
/// The runner owns error classification: whatever [`RemoteError`] it
/// returns is sent back to the caller verbatim.
#[async_trait::async_trait]
pub trait MethodRunner: Send + Sync {
    // ---
    async fn run_method(
        &self,
        path: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Value, RemoteError>;
}

/// Shared method runner pointer.
pub type RunnerPtr = Arc<dyn MethodRunner>;

/// Acquire a mutex guard, ignoring poisoning.
///
/// The guarded state is only touched by short, non-panicking critical
/// sections; a poisoned lock still holds consistent data.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct State {
    // ---
    next_seq: u64,
    pending: PendingCalls,
    closed: bool,
}

/// Removes one call's pending entry when the call's future ends.
///
/// Covers completion, failure and a caller that stops waiting (for
/// example under `tokio::time::timeout`). Entries already taken by a
/// response or a close are left alone.
struct PendingEntry<'a> {
    state: &'a Mutex<State>,
    seq: u64,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        lock_ignore_poison(self.state).pending.remove(self.seq);
    }
}

struct Inner {
    // ---
    id: ConnectionId,
    config: RpcConfig,
    transport: TransportPtr,
    runner: RunnerPtr,
    state: Mutex<State>,
}

/// One connection's protocol engine.
///
/// Cheap to clone (internally `Arc`-backed); clones share all state.
#[derive(Clone)]
pub struct Wire {
    inner: Arc<Inner>,
}

impl Wire {
    // ---
    /// Create an open wire over `transport`, answering requests with `runner`.
    pub fn new(transport: TransportPtr, runner: RunnerPtr, config: RpcConfig) -> Self {
        // ---
        let id = ConnectionId::generate();
        log_debug!("wire {id} ({}) opened", config.label);

        Self {
            inner: Arc::new(Inner {
                id,
                config,
                transport,
                runner,
                state: Mutex::new(State {
                    next_seq: 0,
                    pending: PendingCalls::new(),
                    closed: false,
                }),
            }),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.inner.id
    }

    pub fn config(&self) -> &RpcConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        lock_ignore_poison(&self.inner.state).closed
    }

    /// Number of outbound calls still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        lock_ignore_poison(&self.inner.state).pending.len()
    }

    /// Call `path` on the peer and wait for its response.
    ///
    /// # Errors
    ///
    /// - `RpcError::ConnectionClosed` - the wire is closed, or closes before
    ///   the response arrives
    /// - `RpcError::Send` - the transport rejected the request; the call is
    ///   forgotten and the connection stays up
    /// - `RpcError::Remote` - the peer answered with an error response
    /// - `RpcError::Encode` - the arguments are too large to encode
    ///
    /// Dropping the returned future forgets the call; a late response to
    /// it is logged and discarded.
    pub async fn call(&self, path: &str, args: Vec<Value>) -> Result<Value> {
        // ---
        let (seq, rx) = {
            let mut state = lock_ignore_poison(&self.inner.state);
            if state.closed {
                return Err(RpcError::ConnectionClosed);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            (seq, state.pending.register(seq))
        };
        let _entry = PendingEntry {
            state: &self.inner.state,
            seq,
        };

        let request = Message::Request {
            seq,
            path: path.to_string(),
            args,
        };
        let frame = request.encode()?;
        log_debug!("calling {path} with seq {seq}");

        if let Err(err) = self.inner.transport.send(frame).await {
            log_warn!("failed to send request {seq} for {path}: {err}");
            return Err(match err {
                RpcError::Send(_) => err,
                other => RpcError::Send(other.to_string()),
            });
        }

        // A dropped sender means the entry was discarded with the wire.
        rx.await.unwrap_or(Err(RpcError::ConnectionClosed))
    }

    /// Feed one transport event into the engine.
    ///
    /// Processing runs inside a span carrying the connection id.
    pub async fn dispatch(&self, event: Inbound) {
        // ---
        let id = self.inner.id.clone();
        let label = self.inner.config.label.clone();
        in_connection_span!(id, label, async move {
            match event {
                Inbound::Binary(payload) => self.handle_inbound(payload).await,
                Inbound::Text(_) => self.handle_text().await,
                Inbound::Closed { code, reason } => {
                    log_debug!("transport closed with {code}: {reason}");
                    self.handle_closed();
                }
            }
        })
        .await
    }

    /// Handle one binary frame.
    pub async fn handle_inbound(&self, payload: Bytes) {
        // ---
        if self.is_closed() {
            log_debug!("ignoring {} byte frame on closed wire", payload.len());
            return;
        }

        let value = match codec::decode(&payload) {
            Ok(value) => value,
            Err(err) => {
                log_error!("failed to decode message: {err}");
                return self.panic(REASON_UNDECODABLE).await;
            }
        };

        match Message::from_value(&value) {
            Ok(Message::Request { seq, path, args }) => self.spawn_request(seq, path, args),
            Ok(Message::Success { seq, result }) => self.resolve(seq, Ok(result)),
            Ok(Message::Error { seq, error }) => self.resolve(seq, Err(RpcError::Remote(error))),
            Err(_) => {
                log_error!("got neither request nor response: {value}");
                self.panic(REASON_INVALID_MESSAGE).await
            }
        }
    }

    /// Handle a text frame. The protocol is binary-only, so this panics.
    pub async fn handle_text(&self) {
        // ---
        self.panic(REASON_NON_BINARY).await
    }

    /// The transport reports the connection gone.
    ///
    /// Fails pending calls without asking the transport to close. After
    /// this, [`Wire::panic`] is a no-op.
    pub fn handle_closed(&self) {
        // ---
        let failed = {
            let mut state = lock_ignore_poison(&self.inner.state);
            if state.closed {
                return;
            }
            state.closed = true;
            state.pending.fail_all()
        };
        log_debug!("wire {} closed by transport, {failed} pending calls failed", self.inner.id);
    }

    /// Tear the connection down with the configured close code.
    pub async fn panic(&self, reason: &str) {
        // ---
        self.panic_with(reason, self.inner.config.panic_close_code).await
    }

    /// Tear the connection down with an explicit close code.
    ///
    /// Only the first call (across all clones and tasks) has any effect.
    pub async fn panic_with(&self, reason: &str, code: u16) {
        // ---
        let failed = {
            let mut state = lock_ignore_poison(&self.inner.state);
            if state.closed {
                return;
            }
            state.closed = true;
            state.pending.fail_all()
        };

        log_error!("connection closed due to {reason} ({failed} pending calls failed)");
        self.inner.transport.close(code, reason).await;
    }

    fn resolve(&self, seq: u64, outcome: Result<Value>) {
        // ---
        let delivered = lock_ignore_poison(&self.inner.state)
            .pending
            .complete(seq, outcome);
        if !delivered {
            log_warn!("got unwanted response, seq: {seq}");
        }
    }

    fn spawn_request(&self, seq: u64, path: String, args: Vec<Value>) {
        // ---
        let wire = self.clone();
        let id = self.inner.id.clone();
        let label = self.inner.config.label.clone();
        tokio::spawn(in_connection_span!(id, label, async move {
            wire.answer(seq, path, args).await
        }));
    }

    async fn answer(&self, seq: u64, path: String, args: Vec<Value>) {
        // ---
        let response = match self.inner.runner.run_method(&path, args).await {
            Ok(result) => Message::Success { seq, result },
            Err(error) => {
                log_warn!("request {seq} for {path} failed: {error}");
                Message::Error { seq, error }
            }
        };

        let frame = match response.encode() {
            Ok(frame) => frame,
            Err(err) => {
                log_error!("failed to encode response {seq}: {err}");
                let fallback = Message::Error {
                    seq,
                    error: RemoteError::internal(err.to_string()),
                };
                match fallback.encode() {
                    Ok(frame) => frame,
                    Err(_) => return,
                }
            }
        };

        if self.is_closed() {
            log_debug!("dropping response {seq}, wire closed");
            return;
        }
        if let Err(err) = self.inner.transport.send(frame).await {
            log_error!("failed to send response {seq}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::Transport;
    use std::time::Duration;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<Bytes>>,
        closes: Mutex<Vec<(u16, String)>>,
        fail_sends: bool,
    }

    #[async_trait::async_trait]
    impl Transport for Recording {
        async fn send(&self, payload: Bytes) -> Result<()> {
            if self.fail_sends {
                return Err(RpcError::Send("link down".into()));
            }
            self.sent.lock().unwrap().push(payload);
            Ok(())
        }

        async fn close(&self, code: u16, reason: &str) {
            self.closes.lock().unwrap().push((code, reason.to_string()));
        }
    }

    struct Echo;

    #[async_trait::async_trait]
    impl MethodRunner for Echo {
        async fn run_method(
            &self,
            path: &str,
            args: Vec<Value>,
        ) -> std::result::Result<Value, RemoteError> {
            match path {
                "echo" => Ok(Value::Array(args)),
                _ => Err(RemoteError::not_found(path)),
            }
        }
    }

    fn wire_over(transport: Arc<Recording>) -> Wire {
        Wire::new(transport, Arc::new(Echo), RpcConfig::default())
    }

    fn sent_messages(transport: &Recording) -> Vec<Message> {
        transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|b| Message::from_value(&codec::decode(b).unwrap()).unwrap())
            .collect()
    }

    async fn wait_for_sends(transport: &Recording, count: usize) {
        for _ in 0..100 {
            if transport.sent.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} sends");
    }

    #[tokio::test]
    async fn calls_get_increasing_seqs_and_resolve_out_of_order() {
        // ---
        let transport = Arc::new(Recording::default());
        let wire = wire_over(transport.clone());

        let first = tokio::spawn({
            let wire = wire.clone();
            async move { wire.call("a", vec![]).await }
        });
        wait_for_sends(&transport, 1).await;
        let second = tokio::spawn({
            let wire = wire.clone();
            async move { wire.call("b", vec![]).await }
        });
        wait_for_sends(&transport, 2).await;

        let seqs: Vec<u64> = sent_messages(&transport).iter().map(Message::seq).collect();
        assert_eq!(seqs, vec![0, 1]);
        assert_eq!(wire.pending_calls(), 2);

        let reply = |seq, n| Message::Success {
            seq,
            result: Value::Int(n),
        };
        wire.handle_inbound(reply(1, 20).encode().unwrap()).await;
        wire.handle_inbound(reply(0, 10).encode().unwrap()).await;

        assert_eq!(second.await.unwrap(), Ok(Value::Int(20)));
        assert_eq!(first.await.unwrap(), Ok(Value::Int(10)));
        assert_eq!(wire.pending_calls(), 0);
    }

    #[tokio::test]
    async fn error_response_rejects_the_call() {
        // ---
        let transport = Arc::new(Recording::default());
        let wire = wire_over(transport.clone());

        let call = tokio::spawn({
            let wire = wire.clone();
            async move { wire.call("x", vec![]).await }
        });
        wait_for_sends(&transport, 1).await;

        let error = RemoteError::not_implemented("x");
        wire.handle_inbound(
            Message::Error {
                seq: 0,
                error: error.clone(),
            }
            .encode()
            .unwrap(),
        )
        .await;

        assert_eq!(call.await.unwrap(), Err(RpcError::Remote(error)));
    }

    #[tokio::test]
    async fn unmatched_response_is_dropped() {
        // ---
        let transport = Arc::new(Recording::default());
        let wire = wire_over(transport.clone());

        wire.handle_inbound(
            Message::Success {
                seq: 42,
                result: Value::Nil,
            }
            .encode()
            .unwrap(),
        )
        .await;

        assert!(!wire.is_closed());
        assert!(transport.closes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inbound_request_is_answered_with_same_seq() {
        // ---
        let transport = Arc::new(Recording::default());
        let wire = wire_over(transport.clone());

        let request = Message::Request {
            seq: 9,
            path: "echo".into(),
            args: vec![Value::from("hi")],
        };
        wire.handle_inbound(request.encode().unwrap()).await;
        wait_for_sends(&transport, 1).await;

        assert_eq!(
            sent_messages(&transport),
            vec![Message::Success {
                seq: 9,
                result: Value::Array(vec![Value::from("hi")]),
            }]
        );
    }

    #[tokio::test]
    async fn runner_error_becomes_error_response() {
        // ---
        let transport = Arc::new(Recording::default());
        let wire = wire_over(transport.clone());

        let request = Message::Request {
            seq: 1,
            path: "nope".into(),
            args: vec![],
        };
        wire.handle_inbound(request.encode().unwrap()).await;
        wait_for_sends(&transport, 1).await;

        assert_eq!(
            sent_messages(&transport),
            vec![Message::Error {
                seq: 1,
                error: RemoteError::not_found("nope"),
            }]
        );
        assert!(!wire.is_closed());
    }

    #[tokio::test]
    async fn garbage_panics_once_and_fails_pending_calls() {
        // ---
        let transport = Arc::new(Recording::default());
        let wire = wire_over(transport.clone());

        let call = tokio::spawn({
            let wire = wire.clone();
            async move { wire.call("a", vec![]).await }
        });
        wait_for_sends(&transport, 1).await;

        wire.handle_inbound(Bytes::from_static(&[0xc1; 10])).await;
        wire.handle_inbound(Bytes::from_static(&[0xc1; 10])).await;

        assert_eq!(call.await.unwrap(), Err(RpcError::ConnectionClosed));
        assert_eq!(
            *transport.closes.lock().unwrap(),
            vec![(4033, REASON_UNDECODABLE.to_string())]
        );
        assert_eq!(wire.call("a", vec![]).await, Err(RpcError::ConnectionClosed));
    }

    #[tokio::test]
    async fn shape_and_framing_faults_panic_with_their_reasons() {
        // ---
        let transport = Arc::new(Recording::default());
        wire_over(transport.clone())
            .handle_inbound(codec::encode(&Value::Int(1)).unwrap())
            .await;

        let text_transport = Arc::new(Recording::default());
        wire_over(text_transport.clone())
            .dispatch(Inbound::Text("hello".into()))
            .await;

        assert_eq!(
            *transport.closes.lock().unwrap(),
            vec![(4033, REASON_INVALID_MESSAGE.to_string())]
        );
        assert_eq!(
            *text_transport.closes.lock().unwrap(),
            vec![(4033, REASON_NON_BINARY.to_string())]
        );
    }

    #[tokio::test]
    async fn concurrent_panics_close_once() {
        // ---
        let transport = Arc::new(Recording::default());
        let wire = wire_over(transport.clone());

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let wire = wire.clone();
                tokio::spawn(async move { wire.panic_with(&format!("reason {i}"), 4000 + i).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(transport.closes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn send_failure_fails_only_that_call() {
        // ---
        let transport = Arc::new(Recording {
            fail_sends: true,
            ..Recording::default()
        });
        let wire = wire_over(transport.clone());

        assert!(matches!(
            wire.call("a", vec![]).await,
            Err(RpcError::Send(_))
        ));
        assert_eq!(wire.pending_calls(), 0);
        assert!(!wire.is_closed());
    }

    #[tokio::test]
    async fn abandoned_calls_leave_no_pending_entries() {
        // ---
        let transport = Arc::new(Recording::default());
        let wire = wire_over(transport.clone());

        for _ in 0..5 {
            let outcome =
                tokio::time::timeout(Duration::from_millis(10), wire.call("x", vec![])).await;
            assert!(outcome.is_err());
        }
        assert_eq!(transport.sent.lock().unwrap().len(), 5);
        assert_eq!(wire.pending_calls(), 0);

        // A late answer to an abandoned call is only unwanted.
        let late = Message::Success {
            seq: 0,
            result: Value::Nil,
        };
        wire.handle_inbound(late.encode().unwrap()).await;
        assert!(!wire.is_closed());
    }

    #[tokio::test]
    async fn transport_close_fails_pending_without_closing_back() {
        // ---
        let transport = Arc::new(Recording::default());
        let wire = wire_over(transport.clone());

        let call = tokio::spawn({
            let wire = wire.clone();
            async move { wire.call("a", vec![]).await }
        });
        wait_for_sends(&transport, 1).await;

        wire.dispatch(Inbound::Closed {
            code: 1000,
            reason: "bye".into(),
        })
        .await;
        wire.panic("late").await;

        assert_eq!(call.await.unwrap(), Err(RpcError::ConnectionClosed));
        assert!(transport.closes.lock().unwrap().is_empty());
    }
}
