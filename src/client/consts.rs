pub const BASE_URL_ENV: &str = "VOICE_SESSION_BASE_URL";
pub const API_KEY_ENV: &str = "VOICE_SESSION_API_KEY";

pub const DEFAULT_BASE_URL: &str = "http://localhost:7860";
pub const DEFAULT_CONNECT_PATH: &str = "/connect";
pub const DEFAULT_CAPACITY: usize = 1024;
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

pub const AUTHORIZATION_HEADER: &str = "Authorization";

pub const STATUS_CONNECTING: &str = "Connecting…";
pub const STATUS_CONNECTED: &str = "Connected";
pub const STATUS_READY: &str = "Ready";
pub const STATUS_DISCONNECTING: &str = "Disconnecting…";
pub const STATUS_DISCONNECTED: &str = "Disconnected";
pub const STATUS_FAILED: &str = "Connection failed";
pub const STATUS_LOST: &str = "Connection lost";
