pub mod client;
pub mod server;

pub use client::ClientMessage;
pub use server::ServerMessage;

/// Label carried by every message the backend's RTVI processor understands.
pub const RTVI_LABEL: &str = "rtvi-ai";

/// Outer shape shared by client and server messages.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,

    /// Message kind, e.g. `bot-ready`
    #[serde(rename = "type")]
    kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    /// Kind-specific payload
    #[serde(default)]
    data: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: &str, data: serde_json::Value) -> Self {
        Self {
            label: Some(RTVI_LABEL.to_string()),
            kind: kind.to_string(),
            id: None,
            data,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    pub(crate) fn into_data(self) -> serde_json::Value {
        self.data
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid `{kind}` payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}
