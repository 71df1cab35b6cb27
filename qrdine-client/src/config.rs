//! Client configuration

/// Client configuration for connecting to the hosted backend
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Project base URL (e.g., "https://abc.example.co")
    pub base_url: String,

    /// Public (anon) API key, sent on every request
    pub api_key: String,

    /// User access token; falls back to the API key when absent
    pub token: Option<String>,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Realtime websocket URL; derived from `base_url` when absent
    pub realtime_url: Option<String>,

    /// Realtime heartbeat interval in seconds
    pub heartbeat_interval: u64,
}

impl ClientConfig {
    /// Create a new client configuration
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            token: None,
            timeout: 30,
            realtime_url: None,
            heartbeat_interval: 25,
        }
    }

    /// Set the user access token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Set an explicit realtime websocket URL
    pub fn with_realtime_url(mut self, url: impl Into<String>) -> Self {
        self.realtime_url = Some(url.into());
        self
    }

    /// Set the realtime heartbeat interval
    pub fn with_heartbeat_interval(mut self, seconds: u64) -> Self {
        self.heartbeat_interval = seconds;
        self
    }

    /// Websocket endpoint for the change feed
    ///
    /// `https://host` becomes `wss://host/realtime/v1/websocket`.
    pub fn realtime_endpoint(&self) -> String {
        let base = match &self.realtime_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let base = self.base_url.trim_end_matches('/');
                let ws = if let Some(rest) = base.strip_prefix("https://") {
                    format!("wss://{rest}")
                } else if let Some(rest) = base.strip_prefix("http://") {
                    format!("ws://{rest}")
                } else {
                    base.to_string()
                };
                format!("{ws}/realtime/v1")
            }
        };
        format!("{base}/websocket?apikey={}&vsn=1.0.0", self.api_key)
    }

    /// Create an HTTP client from this configuration
    pub fn build_http_client(&self) -> super::ClientResult<super::HttpClient> {
        super::HttpClient::new(self)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:54321", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("https://demo.example.co/", "anon")
            .with_token("jwt")
            .with_timeout(5);

        assert_eq!(config.token.as_deref(), Some("jwt"));
        assert_eq!(config.timeout, 5);
        assert_eq!(
            config.realtime_endpoint(),
            "wss://demo.example.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[test]
    fn test_explicit_realtime_url() {
        let config = ClientConfig::new("http://localhost:54321", "k")
            .with_realtime_url("ws://127.0.0.1:4000/socket/");
        assert_eq!(
            config.realtime_endpoint(),
            "ws://127.0.0.1:4000/socket/websocket?apikey=k&vsn=1.0.0"
        );
    }
}
