use std::fmt;

/// Lifecycle of the single session a [`crate::SessionClient`] manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Error,
}

impl SessionState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle | Disconnected | Error, Connecting)
                | (Connecting, Connected | Error | Idle | Disconnected)
                | (Connected, Disconnecting | Error)
                | (Disconnecting, Disconnected | Error)
        )
    }

    /// `connect()` is only honoured when no session is alive or being set up.
    pub fn accepts_connect(self) -> bool {
        self.can_transition_to(SessionState::Connecting)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnecting => "disconnecting",
            SessionState::Disconnected => "disconnected",
            SessionState::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
