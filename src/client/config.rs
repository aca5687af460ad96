use secrecy::SecretString;

use crate::client::consts::{
    API_KEY_ENV, BASE_URL_ENV, DEFAULT_BASE_URL, DEFAULT_CAPACITY, DEFAULT_CONNECT_PATH,
    DEFAULT_SAMPLE_RATE,
};

#[derive(Debug)]
pub struct Config {
    base_url: String,
    connect_path: String,
    api_key: Option<SecretString>,
    capacity: usize,
    sample_rate: u32,
    request_data: serde_json::Value,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_connect_path(mut self, connect_path: &str) -> Self {
        self.config.connect_path = connect_path.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = Some(SecretString::from(api_key.to_string()));
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity.max(1);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// JSON body posted to the connect endpoint.
    pub fn with_request_data(mut self, request_data: serde_json::Value) -> Self {
        self.config.request_data = request_data;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Defaults, with the base url and api key read from the environment.
    pub fn new() -> Self {
        Self {
            base_url: std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            connect_path: DEFAULT_CONNECT_PATH.to_string(),
            api_key: std::env::var(API_KEY_ENV)
                .ok()
                .filter(|key| !key.is_empty())
                .map(SecretString::from),
            capacity: DEFAULT_CAPACITY,
            sample_rate: DEFAULT_SAMPLE_RATE,
            request_data: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn connect_path(&self) -> &str {
        &self.connect_path
    }

    pub fn connect_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.connect_path.trim_start_matches('/')
        )
    }

    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn request_data(&self) -> &serde_json::Value {
        &self.request_data
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
