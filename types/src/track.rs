#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Wire description of a media track announced by the backend.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TrackDescriptor {
    id: String,
    kind: TrackKind,

    /// True for tracks captured on this side of the connection
    #[serde(default)]
    local: bool,
}

impl TrackDescriptor {
    pub fn new(id: &str, kind: TrackKind, local: bool) -> Self {
        Self {
            id: id.to_string(),
            kind,
            local,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn is_inbound_audio(&self) -> bool {
        !self.local && self.kind == TrackKind::Audio
    }
}
