use crate::events::Envelope;

/// RTVI protocol version this client speaks.
pub const RTVI_PROTOCOL_VERSION: &str = "0.3.0";

/// Messages sent from the client to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Sent once the session is up; the backend answers with `bot-ready`.
    ClientReady,
    /// Asks the backend to end the conversation before the socket closes.
    DisconnectBot,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClientReady => "client-ready",
            Self::DisconnectBot => "disconnect-bot",
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let data = match self {
            Self::ClientReady => serde_json::json!({
                "version": RTVI_PROTOCOL_VERSION,
                "about": {
                    "library": "voice-session",
                    "library_version": env!("CARGO_PKG_VERSION"),
                },
            }),
            Self::DisconnectBot => serde_json::Value::Null,
        };
        Envelope::new(self.kind(), data)
    }

    /// Serializes the message into a text frame tagged with `id`.
    pub fn encode(&self, id: &str) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_envelope().with_id(id))
    }
}
