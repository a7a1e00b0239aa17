//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for a reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between task status polls.
    #[serde(default = "EngineConfig::default_poll_interval")]
    pub task_poll_interval_seconds: u64,

    /// Seconds before a task is reported as timed out.
    #[serde(default = "EngineConfig::default_task_timeout")]
    pub task_timeout_seconds: u64,

    /// Consecutive unrecognisable task states tolerated before giving up.
    #[serde(default = "EngineConfig::default_max_unknown_polls")]
    pub max_unknown_polls: u32,

    /// Page size for list operations.
    #[serde(default = "EngineConfig::default_page_size")]
    pub page_size: usize,

    /// Directory for generated documents when no file path is given.
    #[serde(default = "EngineConfig::default_output_dir")]
    pub output_dir: PathBuf,
}

impl EngineConfig {
    const fn default_poll_interval() -> u64 {
        2
    }

    const fn default_task_timeout() -> u64 {
        1200 // 20 minutes
    }

    const fn default_max_unknown_polls() -> u32 {
        5
    }

    const fn default_page_size() -> usize {
        500
    }

    fn default_output_dir() -> PathBuf {
        PathBuf::from(".")
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `CATALYST_TASK_POLL_INTERVAL`: seconds between task polls
    /// - `CATALYST_TASK_TIMEOUT`: task deadline in seconds
    /// - `CATALYST_MAX_UNKNOWN_POLLS`: tolerated unrecognisable task states
    /// - `CATALYST_PAGE_SIZE`: list page size
    /// - `CATALYST_OUTPUT_DIR`: directory for generated documents
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CATALYST_TASK_POLL_INTERVAL") {
            if let Ok(n) = val.parse() {
                config.task_poll_interval_seconds = n;
            }
        }
        if let Ok(val) = std::env::var("CATALYST_TASK_TIMEOUT") {
            if let Ok(n) = val.parse() {
                config.task_timeout_seconds = n;
            }
        }
        if let Ok(val) = std::env::var("CATALYST_MAX_UNKNOWN_POLLS") {
            if let Ok(n) = val.parse() {
                config.max_unknown_polls = n;
            }
        }
        if let Ok(val) = std::env::var("CATALYST_PAGE_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.page_size = n.max(1);
            }
        }
        if let Ok(val) = std::env::var("CATALYST_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(val);
        }

        config
    }

    /// Get the poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.task_poll_interval_seconds)
    }

    /// Get the task deadline as a `Duration`.
    #[must_use]
    pub const fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_seconds)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            task_poll_interval_seconds: Self::default_poll_interval(),
            task_timeout_seconds: Self::default_task_timeout(),
            max_unknown_polls: Self::default_max_unknown_polls(),
            page_size: Self::default_page_size(),
            output_dir: Self::default_output_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.task_timeout(), Duration::from_secs(1200));
        assert_eq!(config.page_size, 500);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let config: EngineConfig = serde_yaml::from_str("task_timeout_seconds: 60\n").unwrap();
        assert_eq!(config.task_timeout_seconds, 60);
        assert_eq!(config.task_poll_interval_seconds, 2);
        assert_eq!(config.max_unknown_polls, 5);
    }
}
