/// Body returned by the backend's connect endpoint.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ConnectResponse {
    #[serde(default)]
    ws_url: Option<String>,

    /// Older backends only fill this one in
    #[serde(default)]
    room_url: Option<String>,

    #[serde(default)]
    token: Option<String>,

    #[serde(default)]
    config: Vec<serde_json::Value>,

    #[serde(default)]
    endpoints: Option<Endpoints>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Endpoints {
    #[serde(default)]
    connect: Option<String>,
    #[serde(default)]
    action: Option<String>,
}

impl Endpoints {
    pub fn connect(&self) -> Option<&str> {
        self.connect.as_deref()
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }
}

impl ConnectResponse {
    pub fn new(ws_url: &str) -> Self {
        Self {
            ws_url: Some(ws_url.to_string()),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// The websocket to open: `ws_url`, falling back to `room_url`.
    pub fn socket_url(&self) -> Option<&str> {
        self.ws_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .or_else(|| self.room_url.as_deref().filter(|url| !url.is_empty()))
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.is_empty())
    }

    pub fn config(&self) -> &[serde_json::Value] {
        &self.config
    }

    pub fn endpoints(&self) -> Option<&Endpoints> {
        self.endpoints.as_ref()
    }
}
