use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub admin: Option<AdminConfig>,

    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

/// Names under which dependents know the two data sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_live_source")]
    pub live: String,

    #[serde(default = "default_fallback_source")]
    pub fallback: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            live: default_live_source(),
            fallback: default_fallback_source(),
        }
    }
}

fn default_live_source() -> String {
    "live".to_string()
}

fn default_fallback_source() -> String {
    "fallback".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_address")]
    pub address: String,
}

fn default_admin_address() -> String {
    "127.0.0.1:9190".to_string()
}

/// Settings for the connection controller watching one dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Address that answers a GET with a 2xx status while the dependency is up
    pub health_check_url: String,

    /// Upper bound for a single probe in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Retry delay after the first failure in milliseconds; doubles per failure
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Cap on the retry delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Consecutive failures before automatic retries stop
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_error_history_capacity")]
    pub error_history_capacity: usize,

    /// Serve from the fallback source from startup, without probing
    #[serde(default)]
    pub start_in_fallback: bool,
}

impl MonitorConfig {
    pub fn new(health_check_url: impl Into<String>) -> Self {
        Self {
            health_check_url: health_check_url.into(),
            timeout_ms: default_timeout(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
            error_history_capacity: default_error_history_capacity(),
            start_in_fallback: false,
        }
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[inline]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    #[inline]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

fn default_timeout() -> u64 {
    5000 // 5 seconds
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    30000 // 30 seconds
}

fn default_max_attempts() -> u32 {
    5
}

fn default_error_history_capacity() -> usize {
    10
}
