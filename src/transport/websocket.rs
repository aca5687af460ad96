use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use voice_session_types::{ConnectResponse, ServerMessage, TrackDescriptor};

use crate::client::Config;
use crate::event::RemoteEvent;
use crate::track::MediaTrack;
use crate::transport::utils;
use crate::transport::{EventRx, Outgoing, Transport, TransportError, TransportFactory};

/// Id given to the inbound audio track when the backend streams audio
/// frames without announcing a track first.
pub const REMOTE_AUDIO_TRACK_ID: &str = "remote-audio";

enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// Tracks live on one connection, in the order they started.
#[derive(Default)]
struct TrackRegistry {
    tracks: Vec<MediaTrack>,
}

impl TrackRegistry {
    fn start(&mut self, descriptor: TrackDescriptor) -> MediaTrack {
        if let Some(track) = self
            .tracks
            .iter()
            .find(|track| track.id() == descriptor.id() && !track.is_stopped())
        {
            return track.clone();
        }
        self.tracks.retain(|track| track.id() != descriptor.id());
        let track = MediaTrack::new(descriptor);
        self.tracks.push(track.clone());
        track
    }

    fn stop(&mut self, descriptor: TrackDescriptor) -> MediaTrack {
        let track = match self.tracks.iter().position(|track| track.id() == descriptor.id()) {
            Some(index) => self.tracks.remove(index),
            None => MediaTrack::new(descriptor),
        };
        track.stop();
        track
    }

    /// The newest live inbound audio track, creating the implicit one if needed.
    fn audio_target(&mut self) -> (MediaTrack, bool) {
        if let Some(track) = self
            .tracks
            .iter()
            .rev()
            .find(|track| track.is_inbound_audio() && !track.is_stopped())
        {
            return (track.clone(), false);
        }
        let track = MediaTrack::inbound_audio(REMOTE_AUDIO_TRACK_ID);
        self.tracks.retain(|existing| existing.id() != REMOTE_AUDIO_TRACK_ID);
        self.tracks.push(track.clone());
        (track, true)
    }

    fn active(&self) -> Vec<MediaTrack> {
        self.tracks
            .iter()
            .filter(|track| !track.is_stopped())
            .cloned()
            .collect()
    }

    fn stop_all(&mut self) {
        for track in self.tracks.drain(..) {
            track.stop();
        }
    }
}

fn lock(tracks: &Mutex<TrackRegistry>) -> MutexGuard<'_, TrackRegistry> {
    tracks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Transport that negotiates over HTTP and then speaks the RTVI message
/// protocol over a websocket, with audio carried in binary frames.
pub struct WebSocketTransport {
    http: reqwest::Client,
    api_key: Option<SecretString>,
    request_data: serde_json::Value,
    capacity: usize,
    out_tx: Option<mpsc::Sender<Frame>>,
    tracks: Arc<Mutex<TrackRegistry>>,
    send_handle: Option<JoinHandle<()>>,
    recv_handle: Option<JoinHandle<()>>,
    next_id: u64,
}

impl WebSocketTransport {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config
                .api_key()
                .map(|key| SecretString::from(key.expose_secret().to_string())),
            request_data: config.request_data().clone(),
            capacity: config.capacity(),
            out_tx: None,
            tracks: Arc::new(Mutex::new(TrackRegistry::default())),
            send_handle: None,
            recv_handle: None,
            next_id: 0,
        }
    }

    async fn negotiate(&self, url: &str) -> Result<ConnectResponse, TransportError> {
        tracing::info!("requesting session from {}", url);
        let mut request = self.http.post(url).json(&self.request_data);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<ConnectResponse>().await?)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&mut self, url: &str) -> Result<EventRx, TransportError> {
        if self.out_tx.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        let session = self.negotiate(url).await?;
        let socket_url = session.socket_url().ok_or_else(|| {
            TransportError::Handshake("connect response carried no websocket url".to_string())
        })?;

        let request = utils::build_request(socket_url, session.token())?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        tracing::info!("websocket connected to {}", socket_url);

        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Frame>(self.capacity);
        let (event_tx, event_rx) = mpsc::channel::<RemoteEvent>(self.capacity);

        let send_handle = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let (message, closing) = match frame {
                    Frame::Text(text) => (Message::Text(text), false),
                    Frame::Binary(bytes) => (Message::Binary(bytes), false),
                    Frame::Close => (Message::Close(None), true),
                };
                if let Err(e) = write.send(message).await {
                    tracing::error!("failed to send message: {}", e);
                }
                if closing {
                    break;
                }
            }
        });

        let tracks = self.tracks.clone();
        let recv_handle = tokio::spawn(async move {
            let reason = loop {
                let message = match read.next().await {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        tracing::error!("failed to read message: {}", e);
                        break format!("failed to read message: {}", e);
                    }
                    None => break "connection closed".to_string(),
                };
                match message {
                    Message::Text(text) => {
                        if let Some(event) = decode_text(&text, &tracks) {
                            if event_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Message::Binary(bytes) => {
                        let (track, announced) = lock(&tracks).audio_target();
                        if announced {
                            tracing::info!("audio arrived before any track, announcing {}", track.id());
                            if event_tx.send(RemoteEvent::TrackStarted(track.clone())).await.is_err() {
                                return;
                            }
                        }
                        track.push_audio(utils::pcm16_from_le_bytes(&bytes).into());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        break match reason {
                            Some(frame) if !frame.reason.is_empty() => {
                                format!("connection closed: {}", frame.reason)
                            }
                            _ => "connection closed".to_string(),
                        };
                    }
                    _ => {}
                }
            };
            lock(&tracks).stop_all();
            let _ = event_tx.send(RemoteEvent::FatalError(reason)).await;
        });

        self.out_tx = Some(out_tx);
        self.send_handle = Some(send_handle);
        self.recv_handle = Some(recv_handle);
        Ok(event_rx)
    }

    async fn send(&mut self, outgoing: Outgoing) -> Result<(), TransportError> {
        let out_tx = self.out_tx.as_ref().ok_or(TransportError::NotOpen)?;
        let frame = match outgoing {
            Outgoing::Message(message) => {
                self.next_id += 1;
                tracing::debug!("sending {}", message.kind());
                Frame::Text(message.encode(&self.next_id.to_string())?)
            }
            Outgoing::Audio(samples) => Frame::Binary(utils::pcm16_to_le_bytes(&samples)),
        };
        out_tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    fn active_tracks(&self) -> Vec<MediaTrack> {
        lock(&self.tracks).active()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let Some(out_tx) = self.out_tx.take() else {
            return Ok(());
        };
        if let Some(recv_handle) = self.recv_handle.take() {
            recv_handle.abort();
        }
        if out_tx.send(Frame::Close).await.is_err() {
            tracing::debug!("writer already gone");
        }
        drop(out_tx);
        if let Some(send_handle) = self.send_handle.take() {
            if let Err(e) = send_handle.await {
                tracing::error!("writer task failed: {}", e);
            }
        }
        lock(&self.tracks).stop_all();
        tracing::info!("websocket transport closed");
        Ok(())
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.recv_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.send_handle.take() {
            handle.abort();
        }
    }
}

fn decode_text(text: &str, tracks: &Mutex<TrackRegistry>) -> Option<RemoteEvent> {
    let message = match ServerMessage::decode(text) {
        Ok(Some(message)) => message,
        Ok(None) => {
            tracing::debug!("ignoring message: {}", text);
            return None;
        }
        Err(e) => {
            tracing::error!("failed to decode message: {}, text=> {:?}", e, text);
            return Some(RemoteEvent::MessageError(e.to_string()));
        }
    };
    tracing::debug!("received message: {}", message.kind());

    let event = match message {
        ServerMessage::BotReady(_) => RemoteEvent::Ready,
        ServerMessage::UserTranscription(data) => RemoteEvent::UserTranscript {
            text: data.text().to_string(),
            is_final: data.is_final(),
        },
        ServerMessage::BotTranscription(data) => RemoteEvent::BotTranscript {
            text: data.text().to_string(),
        },
        ServerMessage::TrackStarted(descriptor) => RemoteEvent::TrackStarted(lock(tracks).start(descriptor)),
        ServerMessage::TrackStopped(descriptor) => RemoteEvent::TrackStopped(lock(tracks).stop(descriptor)),
        ServerMessage::Error(data) if data.is_fatal() => RemoteEvent::FatalError(data.error().to_string()),
        ServerMessage::Error(data) | ServerMessage::ErrorResponse(data) => {
            RemoteEvent::MessageError(data.error().to_string())
        }
    };
    Some(event)
}

/// Produces a [`WebSocketTransport`] per connect attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransportFactory;

impl TransportFactory for WebSocketTransportFactory {
    fn create(&self, config: &Config) -> Box<dyn Transport> {
        Box::new(WebSocketTransport::new(config))
    }
}
