mod binder;
mod client;
mod device;
mod error;
mod event;
mod notify;
mod router;
mod state;
mod track;
pub mod transport;

#[cfg(feature = "native-audio")]
pub mod native;

pub use voice_session_types as types;

pub use binder::PlaybackSink;
pub use client::{Capabilities, Config, ConfigBuilder, SessionClient, Stats};
pub use device::{DeviceError, DeviceProvider, MediaStream};
pub use error::SessionError;
pub use event::RemoteEvent;
pub use notify::{Notification, NotificationRx, Speaker};
pub use state::SessionState;
pub use track::{AudioRx, MediaTrack};
pub use transport::websocket::{WebSocketTransport, WebSocketTransportFactory};
pub use transport::{EventRx, Outgoing, Transport, TransportError, TransportFactory};

#[cfg(feature = "utils")]
pub use voice_session_utils as utils;
