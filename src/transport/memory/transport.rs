use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::macros::log_debug;
use crate::{Inbound, Result, RpcConfig, RpcError, Transport};

/// State shared by both ends of a pair.
///
/// Holds the only long-lived senders into the two inboxes. Closing takes
/// them out, so an inbox too full for the close notification still ends
/// (`recv` returns `None`) once drained.
struct Link {
    // ---
    inboxes: Mutex<Option<[mpsc::Sender<Inbound>; 2]>>,
}

impl Link {
    // ---
    fn inboxes(&self) -> MutexGuard<'_, Option<[mpsc::Sender<Inbound>; 2]>> {
        match self.inboxes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// One end of an in-memory connection.
///
/// Sends go to the peer's inbox. Closing is shared: once either end closes,
/// both are closed.
pub struct MemoryTransport {
    // ---
    link: Arc<Link>,
    side: usize,
}

/// A transport plus the inbox its peer's messages arrive on.
pub struct MemoryEndpoint {
    pub transport: Arc<MemoryTransport>,
    pub inbox: mpsc::Receiver<Inbound>,
}

impl MemoryTransport {
    // ---
    /// Deliver a text frame to the peer.
    ///
    /// The protocol never sends text; this exists to exercise how a peer
    /// reacts to one.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        // ---
        self.deliver(Inbound::Text(text.into())).await
    }

    pub fn is_closed(&self) -> bool {
        self.link.inboxes().is_none()
    }

    async fn deliver(&self, event: Inbound) -> Result<()> {
        // ---
        let peer = match self.link.inboxes().as_ref() {
            Some(inboxes) => inboxes[1 - self.side].clone(),
            None => return Err(RpcError::Send("memory transport closed".into())),
        };
        peer.send(event)
            .await
            .map_err(|_| RpcError::Send("peer inbox dropped".into()))
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    async fn send(&self, payload: Bytes) -> Result<()> {
        // ---
        self.deliver(Inbound::Binary(payload)).await
    }

    /// Close both ends.
    ///
    /// Each inbox gets an [`Inbound::Closed`] event when it has room for
    /// one. Either way its channel ends after the messages already queued.
    async fn close(&self, code: u16, reason: &str) {
        // ---
        let Some(inboxes) = self.link.inboxes().take() else {
            return;
        };
        log_debug!("memory transport closing with {code}: {reason}");

        for inbox in inboxes {
            let event = Inbound::Closed {
                code,
                reason: reason.to_string(),
            };
            if inbox.try_send(event).is_err() {
                log_debug!("close notification not queued, inbox ends without it");
            }
        }
    }
}

/// Create two connected endpoints.
///
/// Each direction buffers up to `config.memory_capacity` messages.
pub fn memory_pair(config: &RpcConfig) -> (MemoryEndpoint, MemoryEndpoint) {
    // ---
    let capacity = config.memory_capacity.max(1);
    let (a_tx, a_rx) = mpsc::channel(capacity);
    let (b_tx, b_rx) = mpsc::channel(capacity);
    let link = Arc::new(Link {
        inboxes: Mutex::new(Some([a_tx, b_tx])),
    });

    let a = MemoryEndpoint {
        transport: Arc::new(MemoryTransport {
            link: link.clone(),
            side: 0,
        }),
        inbox: a_rx,
    };
    let b = MemoryEndpoint {
        transport: Arc::new(MemoryTransport { link, side: 1 }),
        inbox: b_rx,
    };
    (a, b)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn sends_arrive_in_order_on_the_peer() {
        // ---
        let (a, mut b) = memory_pair(&RpcConfig::default());

        a.transport.send(Bytes::from_static(b"one")).await.unwrap();
        a.transport.send(Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(
            b.inbox.recv().await,
            Some(Inbound::Binary(Bytes::from_static(b"one")))
        );
        assert_eq!(
            b.inbox.recv().await,
            Some(Inbound::Binary(Bytes::from_static(b"two")))
        );
    }

    #[tokio::test]
    async fn close_reaches_both_ends_once() {
        // ---
        let (mut a, mut b) = memory_pair(&RpcConfig::default());

        a.transport.close(4033, "bad frame").await;
        b.transport.close(1000, "second close").await;

        let expected = Some(Inbound::Closed {
            code: 4033,
            reason: "bad frame".into(),
        });
        assert_eq!(a.inbox.recv().await, expected);
        assert_eq!(b.inbox.recv().await, expected);
        assert!(b.inbox.try_recv().is_err());

        assert!(b.transport.is_closed());
        assert!(matches!(
            b.transport.send(Bytes::new()).await,
            Err(RpcError::Send(_))
        ));
    }

    #[tokio::test]
    async fn close_with_full_inbox_still_ends_the_inbox() {
        // ---
        let config = RpcConfig::default().with_memory_capacity(1);
        let (a, mut b) = memory_pair(&config);

        a.transport.send(Bytes::from_static(b"queued")).await.unwrap();
        a.transport.close(1000, "bye").await;

        assert_eq!(
            b.inbox.recv().await,
            Some(Inbound::Binary(Bytes::from_static(b"queued")))
        );
        assert_eq!(b.inbox.recv().await, None);
        assert!(b.transport.is_closed());
    }

    #[tokio::test]
    async fn text_frames_are_delivered_as_text() {
        // ---
        let (a, mut b) = memory_pair(&RpcConfig::default());
        a.transport.send_text("hello").await.unwrap();
        assert_eq!(b.inbox.recv().await, Some(Inbound::Text("hello".into())));
    }
}
