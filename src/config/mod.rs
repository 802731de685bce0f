mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yml::from_str(content).with_context(|| "Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.monitor.validate()?;

        if let Some(admin) = &self.admin {
            admin
                .address
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid admin address: {}", admin.address))?;
        }

        if let Some(metrics) = &self.metrics {
            metrics
                .address
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid metrics address: {}", metrics.address))?;
        }

        Ok(())
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.health_check_url)
            .with_context(|| format!("Invalid health check URL: {}", self.health_check_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "Health check URL must use http or https, got '{}'",
                url.scheme()
            );
        }

        if self.timeout_ms == 0 {
            anyhow::bail!("timeout_ms must be greater than zero");
        }
        if self.initial_delay_ms == 0 {
            anyhow::bail!("initial_delay_ms must be greater than zero");
        }
        if self.max_delay_ms < self.initial_delay_ms {
            anyhow::bail!(
                "max_delay_ms ({}) must not be below initial_delay_ms ({})",
                self.max_delay_ms,
                self.initial_delay_ms
            );
        }
        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }
        if self.error_history_capacity == 0 {
            anyhow::bail!("error_history_capacity must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_yaml(
            r#"
monitor:
  health_check_url: "http://127.0.0.1:8080/health"
"#,
        )
        .unwrap();

        let monitor = &config.monitor;
        assert_eq!(monitor.timeout_ms, 5000);
        assert_eq!(monitor.initial_delay_ms, 1000);
        assert_eq!(monitor.max_delay_ms, 30000);
        assert_eq!(monitor.max_attempts, 5);
        assert_eq!(monitor.error_history_capacity, 10);
        assert!(!monitor.start_in_fallback);
        assert!(config.admin.is_none());
        assert!(config.metrics.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_yaml(
            r#"
monitor:
  health_check_url: "https://api.example.com/healthz"
  timeout_ms: 2000
  initial_delay_ms: 500
  max_delay_ms: 10000
  max_attempts: 8
  error_history_capacity: 25
  start_in_fallback: true
admin:
  address: "127.0.0.1:9999"
metrics: {}
"#,
        )
        .unwrap();

        assert_eq!(config.monitor.timeout().as_millis(), 2000);
        assert_eq!(config.monitor.initial_delay().as_millis(), 500);
        assert_eq!(config.monitor.max_delay().as_secs(), 10);
        assert_eq!(config.monitor.max_attempts, 8);
        assert!(config.monitor.start_in_fallback);
        assert_eq!(config.admin.unwrap().address, "127.0.0.1:9999");
        assert_eq!(config.metrics.unwrap().address, "0.0.0.0:9090");
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(MonitorConfig::new("not a url").validate().is_err());
        assert!(MonitorConfig::new("ftp://example.com/health").validate().is_err());
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let base = MonitorConfig::new("http://localhost/health");
        assert!(base.validate().is_ok());

        let mut config = base.clone();
        config.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.initial_delay_ms = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.max_delay_ms = 500;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = base;
        config.error_history_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_admin_address() {
        let result = Config::from_yaml(
            r#"
monitor:
  health_check_url: "http://localhost/health"
admin:
  address: "localhost"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = Config::from_yaml(include_str!("../../config.example.yaml")).unwrap();
        assert_eq!(config.sources.live, "task-api");
        assert_eq!(config.sources.fallback, "local-snapshot");
        assert_eq!(config.monitor.max_attempts, 5);
    }

    #[test]
    fn test_missing_monitor_section() {
        assert!(Config::from_yaml("metrics: {}\n").is_err());
    }
}
