//! [`Connector`] over `tokio-tungstenite`.
//!
//! `wss://` endpoints need the `native-tls` feature.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use galley_core::TransportError;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

use crate::transport::{Connector, Socket, SocketFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the peer sent a close frame without a code.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens WebSocket connections.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Socket>, TransportError> {
        let (ws, response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(status = %response.status(), "websocket handshake complete");
        Ok(Box::new(WsSocket { ws }))
    }
}

/// One tungstenite WebSocket.
pub struct WsSocket {
    ws: WsStream,
}

impl WsSocket {
    /// Wrap an already-established stream.
    pub fn new(ws: WsStream) -> Self {
        Self { ws }
    }
}

#[async_trait]
impl Socket for WsSocket {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<SocketFrame, TransportError>> {
        loop {
            let msg = match self.ws.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(TransportError::Read(e.to_string()))),
            };
            match msg {
                Message::Text(text) => return Some(Ok(SocketFrame::Text(text.to_string()))),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(SocketFrame::Text(text))),
                    Err(_) => warn!(len = bytes.len(), "dropping non-UTF-8 binary frame"),
                },
                Message::Close(frame) => {
                    let (code, reason) = frame.map_or_else(
                        || (NO_STATUS_RECEIVED, String::new()),
                        |f| (u16::from(f.code), f.reason.to_string()),
                    );
                    return Some(Ok(SocketFrame::Close { code, reason }));
                }
                // Control frames are answered by tungstenite itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        if let Err(e) = self.ws.close(Some(frame)).await {
            debug!(error = %e, "websocket close failed");
        }
    }
}
