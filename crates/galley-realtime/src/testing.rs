//! In-process transport for tests.
//!
//! [`mock_transport`] returns a [`MockConnector`] to hand to the client and a
//! [`MockController`] that sees every socket open as a [`PendingOpen`]. The
//! test decides whether each open succeeds; an accepted open yields a
//! [`MockServer`] that scripts frames to the client and observes what the
//! client writes.
//!
//! ```ignore
//! let (connector, mut opens) = mock_transport();
//! let client = RealtimeClient::builder(config).connector(connector).spawn()?;
//! let connecting = tokio::spawn({ let c = client.clone(); async move { c.connect().await } });
//! let mut server = opens.next_open().await.unwrap().accept();
//! server.send_event("order_created", json!({"id": "o_1"}));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use galley_core::{TransportError, WireEnvelope};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use url::Url;

use crate::transport::{Connector, Socket, SocketFrame};

type OpenReply = oneshot::Sender<Result<Box<dyn Socket>, TransportError>>;

/// Create a connected connector/controller pair.
pub fn mock_transport() -> (MockConnector, MockController) {
    let (tx, rx) = mpsc::unbounded_channel();
    let count = Arc::new(AtomicUsize::new(0));
    (
        MockConnector {
            opens: tx,
            count: Arc::clone(&count),
        },
        MockController { opens: rx, count },
    )
}

/// Connector half; give it to the client builder.
#[derive(Clone)]
pub struct MockConnector {
    opens: mpsc::UnboundedSender<PendingOpen>,
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Socket>, TransportError> {
        let _ = self.count.fetch_add(1, Ordering::SeqCst);
        let (reply, rx) = oneshot::channel();
        self.opens
            .send(PendingOpen {
                url: url.clone(),
                reply,
            })
            .map_err(|_| TransportError::Connect("mock controller dropped".into()))?;
        rx.await
            .map_err(|_| TransportError::Connect("pending open dropped".into()))?
    }
}

/// Test-side view of socket opens.
pub struct MockController {
    opens: mpsc::UnboundedReceiver<PendingOpen>,
    count: Arc<AtomicUsize>,
}

impl MockController {
    /// Wait for the next open request.
    pub async fn next_open(&mut self) -> Option<PendingOpen> {
        self.opens.recv().await
    }

    /// Next open request if one is already waiting.
    pub fn try_next_open(&mut self) -> Option<PendingOpen> {
        self.opens.try_recv().ok()
    }

    /// Opens requested so far.
    pub fn open_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// One open request awaiting the test's decision.
pub struct PendingOpen {
    url: Url,
    reply: OpenReply,
}

impl PendingOpen {
    /// URL the client tried to open.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Value of a query parameter on the requested URL.
    pub fn query(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Complete the open and return the server side of the socket.
    pub fn accept(self) -> MockServer {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let socket = MockSocket { inbound, outbound };
        let _ = self.reply.send(Ok(Box::new(socket)));
        MockServer {
            to_client,
            from_client,
        }
    }

    /// Fail the open.
    pub fn reject(self, err: TransportError) {
        let _ = self.reply.send(Err(err));
    }
}

struct MockSocket {
    inbound: mpsc::UnboundedReceiver<Result<SocketFrame, TransportError>>,
    outbound: mpsc::UnboundedSender<SocketFrame>,
}

#[async_trait]
impl Socket for MockSocket {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(SocketFrame::Text(text))
            .map_err(|_| TransportError::Send("mock server dropped".into()))
    }

    async fn recv(&mut self) -> Option<Result<SocketFrame, TransportError>> {
        self.inbound.recv().await
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let _ = self.outbound.send(SocketFrame::Close {
            code,
            reason: reason.to_owned(),
        });
        self.inbound.close();
    }
}

/// Server side of an accepted mock socket. Dropping it ends the client's
/// stream.
#[derive(Debug)]
pub struct MockServer {
    to_client: mpsc::UnboundedSender<Result<SocketFrame, TransportError>>,
    from_client: mpsc::UnboundedReceiver<SocketFrame>,
}

impl MockServer {
    /// Push a raw text frame. Returns `false` if the client side is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(Ok(SocketFrame::Text(text.into()))).is_ok()
    }

    /// Push an envelope.
    pub fn send_envelope(&self, envelope: &WireEnvelope) -> bool {
        envelope
            .to_json()
            .is_ok_and(|text| self.send_text(text))
    }

    /// Push a domain event.
    pub fn send_event(&self, event_type: &str, payload: Value) -> bool {
        self.send_envelope(&WireEnvelope::new(event_type, payload))
    }

    /// Answer a heartbeat.
    pub fn send_pong(&self) -> bool {
        self.send_envelope(&WireEnvelope::pong(None))
    }

    /// Close from the server side.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.to_client
            .send(Ok(SocketFrame::Close {
                code,
                reason: reason.to_owned(),
            }))
            .is_ok()
    }

    /// Surface a read error on the client.
    pub fn fail(&self, err: TransportError) -> bool {
        self.to_client.send(Err(err)).is_ok()
    }

    /// Next frame the client wrote, or `None` once the client dropped the socket.
    pub async fn recv(&mut self) -> Option<SocketFrame> {
        self.from_client.recv().await
    }

    /// Next frame the client wrote, if one is already waiting.
    pub fn try_recv(&mut self) -> Option<SocketFrame> {
        self.from_client.try_recv().ok()
    }

    /// Next text frame parsed as an envelope. `None` on close, drop, or a
    /// non-envelope frame.
    pub async fn recv_envelope(&mut self) -> Option<WireEnvelope> {
        match self.recv().await? {
            SocketFrame::Text(text) => WireEnvelope::parse(&text).ok(),
            SocketFrame::Close { .. } => None,
        }
    }
}
