use serde::de::DeserializeOwned;

use crate::events::{DecodeError, Envelope};
use crate::track::TrackDescriptor;

/// `bot-ready` payload
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BotReadyData {
    #[serde(default)]
    version: Option<String>,

    /// Free-form description of the bot pipeline
    #[serde(default)]
    about: Option<serde_json::Value>,
}

impl BotReadyData {
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn about(&self) -> Option<&serde_json::Value> {
        self.about.as_ref()
    }
}

/// `user-transcription` payload
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UserTranscriptionData {
    text: String,

    /// Interim results are superseded by the next transcription for the same turn
    #[serde(rename = "final", default)]
    is_final: bool,

    #[serde(default)]
    timestamp: Option<String>,

    #[serde(default)]
    user_id: Option<String>,
}

impl UserTranscriptionData {
    pub fn new(text: &str, is_final: bool) -> Self {
        Self {
            text: text.to_string(),
            is_final,
            timestamp: None,
            user_id: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

/// `bot-transcription` payload. The backend only sends finished sentences.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BotTranscriptionData {
    text: String,
}

impl BotTranscriptionData {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// `error` and `error-response` payload
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorData {
    #[serde(alias = "message")]
    error: String,

    /// Set by the backend when the pipeline cannot continue
    #[serde(default)]
    fatal: bool,
}

impl ErrorData {
    pub fn new(error: &str, fatal: bool) -> Self {
        Self {
            error: error.to_string(),
            fatal,
        }
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

/// Messages the backend sends over the event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    BotReady(BotReadyData),
    UserTranscription(UserTranscriptionData),
    BotTranscription(BotTranscriptionData),
    TrackStarted(TrackDescriptor),
    TrackStopped(TrackDescriptor),
    Error(ErrorData),
    ErrorResponse(ErrorData),
}

impl ServerMessage {
    /// Decodes one text frame.
    ///
    /// Returns `Ok(None)` for message kinds this client does not act on
    /// (speaking indicators, metrics, ...).
    pub fn decode(text: &str) -> Result<Option<Self>, DecodeError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let kind = envelope.kind().to_string();
        let data = envelope.into_data();

        let message = match kind.as_str() {
            "bot-ready" => {
                // bot-ready may arrive without a payload at all
                let data = if data.is_null() {
                    BotReadyData::default()
                } else {
                    payload(&kind, data)?
                };
                Self::BotReady(data)
            }
            "user-transcription" => Self::UserTranscription(payload(&kind, data)?),
            "bot-transcription" => Self::BotTranscription(payload(&kind, data)?),
            "track-started" => Self::TrackStarted(payload(&kind, data)?),
            "track-stopped" => Self::TrackStopped(payload(&kind, data)?),
            "error" => Self::Error(payload(&kind, data)?),
            "error-response" => Self::ErrorResponse(payload(&kind, data)?),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::BotReady(_) => "bot-ready",
            Self::UserTranscription(_) => "user-transcription",
            Self::BotTranscription(_) => "bot-transcription",
            Self::TrackStarted(_) => "track-started",
            Self::TrackStopped(_) => "track-stopped",
            Self::Error(_) => "error",
            Self::ErrorResponse(_) => "error-response",
        }
    }
}

fn payload<T: DeserializeOwned>(kind: &str, data: serde_json::Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::Payload {
        kind: kind.to_string(),
        source,
    })
}
