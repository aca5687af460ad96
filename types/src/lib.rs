pub mod connect;
pub mod events;
pub mod track;

pub use connect::ConnectResponse;
pub use events::{ClientMessage, DecodeError, Envelope, ServerMessage};
pub use track::{TrackDescriptor, TrackKind};
