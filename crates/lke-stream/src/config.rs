use std::time::Duration;

use crate::errors::ClientError;

/// Default LKE streaming chat endpoint.
pub const DEFAULT_SSE_URL: &str = "https://wss.lke.cloud.tencent.com/v1/qbot/chat/sse";

/// Configuration for [`crate::LkeClient`].
#[derive(Clone, Debug)]
pub struct LkeClientConfig {
    /// Application key identifying the LKE bot.
    pub bot_app_key: String,
    /// Streaming endpoint URL.
    ///
    /// Useful for proxies or local test servers.
    pub endpoint: String,
    /// Upper bound for establishing the connection.
    pub connect_timeout: Duration,
    /// Optional upper bound for one whole streamed answer, body included.
    ///
    /// Unset by default; long answers are read for as long as they stream.
    pub timeout: Option<Duration>,
    /// Value sent as `streaming_throttle` with every query.
    pub streaming_throttle: u32,
    /// Bounded chunk buffer between the decoding task and the consumer.
    pub buffer_capacity: usize,
}

impl LkeClientConfig {
    /// Creates a config with sensible defaults and a provided app key.
    pub fn new(bot_app_key: impl Into<String>) -> Self {
        Self {
            bot_app_key: bot_app_key.into(),
            endpoint: DEFAULT_SSE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            timeout: None,
            streaming_throttle: 1,
            buffer_capacity: 16,
        }
    }

    /// Builds a config from `TENCENT_CLOUD_LKE_APP_KEY` and optional `LKE_SSE_URL`.
    pub fn from_env() -> Result<Self, ClientError> {
        let app_key = std::env::var("TENCENT_CLOUD_LKE_APP_KEY").unwrap_or_default();
        if app_key.trim().is_empty() {
            return Err(ClientError::Config(
                "missing TENCENT_CLOUD_LKE_APP_KEY for LKE client".into(),
            ));
        }
        let mut config = Self::new(app_key.trim());
        if let Ok(endpoint) = std::env::var("LKE_SSE_URL")
            && !endpoint.trim().is_empty()
        {
            config.endpoint = endpoint.trim().to_string();
        }
        Ok(config)
    }

    /// Overrides the streaming endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Caps the total duration of each query.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn streaming_throttle(mut self, throttle: u32) -> Self {
        self.streaming_throttle = throttle;
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.bot_app_key.trim().is_empty() {
            return Err(ClientError::Config("bot_app_key must not be empty".into()));
        }
        if self.endpoint.trim().is_empty() {
            return Err(ClientError::Config("endpoint must not be empty".into()));
        }
        if self.buffer_capacity == 0 {
            return Err(ClientError::Config(
                "buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
