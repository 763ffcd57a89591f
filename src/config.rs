use std::time::Duration;

/// Path of the weather stream endpoint on the server
pub const ENDPOINT_PATH: &str = "/ws/weather";

/// Build the WebSocket URL for a server host (`host` or `host:port`).
///
/// `secure` selects `wss://` over `ws://`, the same way a page served over
/// https would.
pub fn endpoint_url(host: &str, secure: bool) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{}://{}{}", scheme, host.trim_end_matches('/'), ENDPOINT_PATH)
}

/// Configuration for the weather stream client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL to connect to
    pub url: String,
    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
    /// Consecutive failed attempts before giving up until a manual reconnect
    pub max_reconnect_attempts: u32,
    /// Backoff settings for reconnection
    pub backoff: BackoffConfig,
    /// Keepalive settings
    pub keepalive: KeepaliveConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: endpoint_url("localhost:8080", false),
            connect_timeout: Duration::from_secs(10),
            max_reconnect_attempts: 5,
            backoff: BackoffConfig::default(),
            keepalive: KeepaliveConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new builder for configuration
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for ClientConfig
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the WebSocket URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Set the URL from a host, using the standard endpoint path
    pub fn host(mut self, host: &str, secure: bool) -> Self {
        self.config.url = endpoint_url(host, secure);
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the maximum number of reconnection attempts
    pub fn max_reconnect_attempts(mut self, max: u32) -> Self {
        self.config.max_reconnect_attempts = max;
        self
    }

    /// Set backoff configuration
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.config.backoff = config;
        self
    }

    /// Set keepalive configuration
    pub fn keepalive(mut self, config: KeepaliveConfig) -> Self {
        self.config.keepalive = config;
        self
    }

    /// Build the configuration with validation.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let url = url::Url::parse(&self.config.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", self.config.url, e)))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ConfigError::InvalidUrl(format!(
                "unsupported scheme '{}', expected ws or wss",
                url.scheme()
            )));
        }

        if self.config.max_reconnect_attempts == 0 {
            return Err(ConfigError::InvalidReconnectLimit(
                "max_reconnect_attempts cannot be 0".to_string(),
            ));
        }

        if self.config.backoff.max_delay < self.config.backoff.initial_delay {
            return Err(ConfigError::InvalidBackoff(
                "max_delay must be >= initial_delay".to_string(),
            ));
        }

        if self.config.backoff.multiplier <= 0.0 {
            return Err(ConfigError::InvalidBackoff(
                "multiplier must be > 0".to_string(),
            ));
        }

        if self.config.keepalive.ping_interval.is_zero() {
            return Err(ConfigError::InvalidKeepalive(
                "ping_interval must be > 0".to_string(),
            ));
        }

        if let Some(pong_timeout) = self.config.keepalive.pong_timeout {
            if pong_timeout > self.config.keepalive.ping_interval {
                return Err(ConfigError::InvalidKeepalive(
                    "pong_timeout should be <= ping_interval".to_string(),
                ));
            }
        }

        Ok(self.config)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// URL is not a ws:// or wss:// URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Invalid reconnect limit
    #[error("Invalid reconnect limit: {0}")]
    InvalidReconnectLimit(String),
    /// Invalid backoff configuration
    #[error("Invalid backoff configuration: {0}")]
    InvalidBackoff(String),
    /// Invalid keepalive configuration
    #[error("Invalid keepalive configuration: {0}")]
    InvalidKeepalive(String),
}

/// Backoff configuration for reconnection
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Base delay, scaled by `multiplier^attempt`
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to add random jitter to delays
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl BackoffConfig {
    /// Calculate the delay for a given attempt number.
    ///
    /// With the defaults this is `min(1000 * 2^attempt, 30000)` milliseconds.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        if self.jitter {
            // Full jitter: random value between 0 and capped_delay
            let jittered = rand::random::<f64>() * capped_delay;
            Duration::from_millis(jittered as u64)
        } else {
            Duration::from_millis(capped_delay as u64)
        }
    }
}

/// Keepalive configuration
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Interval between application-level `ping` frames
    pub ping_interval: Duration,
    /// Treat the connection as dead if a `pong` does not arrive in time.
    /// `None` disables the check and relies on the transport noticing drops.
    pub pong_timeout: Option<Duration>,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_calculation() {
        let config = BackoffConfig::default();

        for n in 0..5 {
            let expected = (1000u64 * 2u64.pow(n)).min(30_000);
            assert_eq!(config.delay_for_attempt(n), Duration::from_millis(expected));
        }

        // Should cap at max_delay
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(30));
        assert_eq!(config.delay_for_attempt(40), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_with_jitter() {
        let config = BackoffConfig {
            jitter: true,
            ..BackoffConfig::default()
        };

        for attempt in 0..5 {
            let delay = config.delay_for_attempt(attempt);
            let max_expected = Duration::from_millis((1000.0 * 2.0_f64.powi(attempt as i32)) as u64);
            assert!(delay <= max_expected);
        }
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(endpoint_url("localhost:8080", false), "ws://localhost:8080/ws/weather");
        assert_eq!(endpoint_url("weather.example.com/", true), "wss://weather.example.com/ws/weather");
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::builder()
            .host("example.com:9000", false)
            .max_reconnect_attempts(3)
            .build()
            .expect("valid config");

        assert_eq!(config.url, "ws://example.com:9000/ws/weather");
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.keepalive.ping_interval, Duration::from_secs(30)); // default
    }

    #[test]
    fn test_config_builder_rejects_zero_attempts() {
        let result = ClientConfig::builder().max_reconnect_attempts(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidReconnectLimit(_))));
    }

    #[test]
    fn test_config_builder_rejects_http_url() {
        let result = ClientConfig::builder().url("http://example.com/ws/weather").build();
        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_config_builder_rejects_long_pong_timeout() {
        let result = ClientConfig::builder()
            .keepalive(KeepaliveConfig {
                ping_interval: Duration::from_secs(10),
                pong_timeout: Some(Duration::from_secs(20)),
            })
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidKeepalive(_))));
    }
}
