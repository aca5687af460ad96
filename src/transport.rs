use async_trait::async_trait;
use tokio::sync::mpsc;
use voice_session_types::ClientMessage;

use crate::client::Config;
use crate::event::RemoteEvent;
use crate::track::MediaTrack;

mod utils;
pub mod websocket;

pub type EventRx = mpsc::Receiver<RemoteEvent>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("connect request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport is already open")]
    AlreadyOpen,
    #[error("transport is not open")]
    NotOpen,
    #[error("transport closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Message(ClientMessage),
    /// Mono 16-bit PCM at the configured sample rate.
    Audio(Vec<i16>),
}

/// Bidirectional realtime channel to the voice backend.
///
/// `open` hands back the event stream; the stream ending without a
/// `FatalError` is treated as one.
#[async_trait]
pub trait Transport: Send {
    async fn open(&mut self, url: &str) -> Result<EventRx, TransportError>;

    async fn send(&mut self, outgoing: Outgoing) -> Result<(), TransportError>;

    /// Tracks currently live on the connection, oldest first.
    fn active_tracks(&self) -> Vec<MediaTrack>;

    /// Idempotent.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Makes a fresh transport for each connect attempt.
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: &Config) -> Box<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(&Config) -> Box<dyn Transport> + Send + Sync,
{
    fn create(&self, config: &Config) -> Box<dyn Transport> {
        self(config)
    }
}
