//! Transport seam: what the hub and the shell bridge need from a WebSocket.
//! The axum implementation lives here; tests plug in their own sinks.

use std::future::Future;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream, Stream, StreamExt};
use futures_util::SinkExt;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("websocket: {0}")]
    Ws(#[from] axum::Error),
}

/// Outbound half of a message-based connection.
pub trait FrameSink: Send + 'static {
    fn send_text(&mut self, text: &str)
        -> impl Future<Output = Result<(), TransportError>> + Send;

    fn send_binary(
        &mut self,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Best effort; errors are swallowed since the peer may already be gone.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

pub type WsSink = SplitSink<WebSocket, Message>;

impl FrameSink for WsSink {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.send(Message::Text(text.to_owned())).await?;
        Ok(())
    }

    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        self.send(Message::Binary(data)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = SinkExt::close(self).await;
    }
}

/// Inbound frame, stripped of axum specifics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Ping/pong; answered by the websocket layer itself.
    Control,
    Close,
}

impl From<Message> for Frame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(t) => Frame::Text(t),
            Message::Binary(b) => Frame::Binary(b),
            Message::Ping(_) | Message::Pong(_) => Frame::Control,
            Message::Close(_) => Frame::Close,
        }
    }
}

pub fn inbound(
    stream: SplitStream<WebSocket>,
) -> impl Stream<Item = Result<Frame, TransportError>> + Send + Unpin {
    stream.map(|r| r.map(Frame::from).map_err(TransportError::from))
}
