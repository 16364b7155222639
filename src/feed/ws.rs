use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::connection::{Connector, Frame, Session};
use crate::error::TransportError;

/// Connects to a publisher over WebSocket (`ws://` or `wss://`).
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Session = WsSession;

    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<WsSession, TransportError> {
        let (inner, _resp) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(map_ws_error)?;
        Ok(WsSession { inner })
    }
}

pub struct WsSession {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Session for WsSession {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        let msg = self.inner.next().await?;
        Some(msg.map(into_frame).map_err(map_ws_error))
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close(None).await {
            tracing::debug!(error = %e, "WebSocket close handshake failed");
        }
    }
}

fn into_frame(msg: tungstenite::Message) -> Frame {
    match msg {
        tungstenite::Message::Text(text) => {
            tracing::trace!(raw = %text, "Received WebSocket text frame");
            Frame::Text(text)
        }
        tungstenite::Message::Binary(data) => Frame::Binary(data),
        tungstenite::Message::Close(_) => Frame::Close,
        // tokio-tungstenite answers pings itself
        tungstenite::Message::Ping(_)
        | tungstenite::Message::Pong(_)
        | tungstenite::Message::Frame(_) => Frame::Control,
    }
}

fn map_ws_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::Io(io) => TransportError::Io(io),
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        tungstenite::Error::Protocol(p) => TransportError::Protocol(p.to_string()),
        other => TransportError::Handshake(other.to_string()),
    }
}
