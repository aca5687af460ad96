use crate::track::MediaTrack;

/// Backend-originated events, in the order the transport received them.
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    /// The bot finished its own setup and is listening.
    Ready,
    UserTranscript { text: String, is_final: bool },
    /// Bot transcripts are only ever sent final.
    BotTranscript { text: String },
    TrackStarted(MediaTrack),
    TrackStopped(MediaTrack),
    /// A single bad or rejected message. The session stays up.
    MessageError(String),
    /// The channel or pipeline is gone. The session is torn down.
    FatalError(String),
}

impl RemoteEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteEvent::Ready => "ready",
            RemoteEvent::UserTranscript { .. } => "user_transcript",
            RemoteEvent::BotTranscript { .. } => "bot_transcript",
            RemoteEvent::TrackStarted(_) => "track_started",
            RemoteEvent::TrackStopped(_) => "track_stopped",
            RemoteEvent::MessageError(_) => "message_error",
            RemoteEvent::FatalError(_) => "fatal_error",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RemoteEvent::FatalError(_))
    }
}
