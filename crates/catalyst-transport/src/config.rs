//! Transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection settings for a Catalyst Center controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Controller host name or address.
    pub host: String,

    /// HTTPS port.
    #[serde(default = "TransportConfig::default_port")]
    pub port: u16,

    /// API user name.
    pub username: String,

    /// API password.
    #[serde(skip_serializing)]
    pub password: String,

    /// Verify the controller's TLS certificate.
    #[serde(default = "TransportConfig::default_verify")]
    pub verify: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "TransportConfig::default_timeout")]
    pub timeout_seconds: u64,

    /// Explicit base URL, overriding scheme, host and port.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Retry policy for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl TransportConfig {
    const fn default_port() -> u16 {
        443
    }

    const fn default_verify() -> bool {
        true
    }

    const fn default_timeout() -> u64 {
        30
    }

    /// Create a configuration with default port, timeout and retry policy.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: Self::default_port(),
            username: username.into(),
            password: password.into(),
            verify: Self::default_verify(),
            timeout_seconds: Self::default_timeout(),
            base_url: None,
            retry: RetryConfig::default(),
        }
    }

    /// Point the transport at an explicit base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `CATALYST_HOST`: controller host
    /// - `CATALYST_PORT`: HTTPS port
    /// - `CATALYST_USERNAME`: API user
    /// - `CATALYST_PASSWORD`: API password
    /// - `CATALYST_VERIFY`: verify TLS certificates ("true"/"false")
    /// - `CATALYST_TIMEOUT`: per-request timeout in seconds
    /// - `CATALYST_BASE_URL`: explicit base URL
    /// - `CATALYST_MAX_RETRIES`: retry attempts for transient failures
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::new(String::new(), String::new(), String::new());

        if let Ok(val) = std::env::var("CATALYST_HOST") {
            config.host = val;
        }
        if let Ok(val) = std::env::var("CATALYST_PORT") {
            if let Ok(n) = val.parse() {
                config.port = n;
            }
        }
        if let Ok(val) = std::env::var("CATALYST_USERNAME") {
            config.username = val;
        }
        if let Ok(val) = std::env::var("CATALYST_PASSWORD") {
            config.password = val;
        }
        if let Ok(val) = std::env::var("CATALYST_VERIFY") {
            config.verify = !matches!(val.to_lowercase().as_str(), "false" | "0" | "no");
        }
        if let Ok(val) = std::env::var("CATALYST_TIMEOUT") {
            if let Ok(n) = val.parse() {
                config.timeout_seconds = n;
            }
        }
        if let Ok(val) = std::env::var("CATALYST_BASE_URL") {
            config.base_url = Some(val);
        }
        if let Ok(val) = std::env::var("CATALYST_MAX_RETRIES") {
            if let Ok(n) = val.parse() {
                config.retry.max_retries = n;
            }
        }

        config
    }

    /// The base URL requests are issued against, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.port == 443 => format!("https://{}", self.host),
            None => format!("https://{}:{}", self.host, self.port),
        }
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Retry policy for transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "RetryConfig::default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the first retry, in milliseconds.
    #[serde(default = "RetryConfig::default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound on any single backoff, in milliseconds.
    #[serde(default = "RetryConfig::default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Growth factor between retries.
    #[serde(default = "RetryConfig::default_multiplier")]
    pub backoff_multiplier: f64,

    /// Status codes that trigger a retry.
    #[serde(default = "RetryConfig::default_retry_status_codes")]
    pub retry_status_codes: Vec<u16>,
}

impl RetryConfig {
    const fn default_max_retries() -> u32 {
        3
    }

    const fn default_initial_backoff() -> u64 {
        500
    }

    const fn default_max_backoff() -> u64 {
        10_000
    }

    const fn default_multiplier() -> f64 {
        2.0
    }

    fn default_retry_status_codes() -> Vec<u16> {
        vec![429, 502, 503, 504]
    }

    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Returns true if a response with this status should be retried.
    #[must_use]
    pub fn should_retry(&self, status: u16) -> bool {
        self.retry_status_codes.contains(&status)
    }

    /// Backoff before retry number `attempt` (1-based).
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let raw = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: Self::default_max_retries(),
            initial_backoff_ms: Self::default_initial_backoff(),
            max_backoff_ms: Self::default_max_backoff(),
            backoff_multiplier: Self::default_multiplier(),
            retry_status_codes: Self::default_retry_status_codes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TransportConfig::new("dnac.local", "admin", "pw");
        assert_eq!(config.port, 443);
        assert!(config.verify);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.base_url(), "https://dnac.local");
    }

    #[test]
    fn base_url_variants() {
        let mut config = TransportConfig::new("10.0.0.1", "admin", "pw");
        config.port = 8443;
        assert_eq!(config.base_url(), "https://10.0.0.1:8443");

        let config = config.with_base_url("http://127.0.0.1:9000/");
        assert_eq!(config.base_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn backoff_grows_and_caps() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff(1), Duration::from_millis(500));
        assert_eq!(retry.backoff(2), Duration::from_millis(1000));
        assert_eq!(retry.backoff(3), Duration::from_millis(2000));
        assert_eq!(retry.backoff(10), Duration::from_millis(10_000));
    }

    #[test]
    fn retry_status_codes() {
        let retry = RetryConfig::default();
        assert!(retry.should_retry(503));
        assert!(retry.should_retry(429));
        assert!(!retry.should_retry(500));
        assert_eq!(RetryConfig::disabled().max_retries, 0);
    }

    #[test]
    fn deserialize_with_defaults() {
        let config: TransportConfig = serde_json::from_str(
            r#"{"host": "dnac", "username": "u", "password": "p", "verify": false}"#,
        )
        .unwrap();
        assert!(!config.verify);
        assert_eq!(config.port, 443);
        assert_eq!(config.retry, RetryConfig::default());
    }
}
