use super::current_time_millis;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::debug;

/// Why a probe considered the dependency unavailable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// Connection refused, DNS failure, TLS failure and friends
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The dependency answered with a non-success status
    #[error("Unexpected status: {0}")]
    Protocol(u16),

    #[error("Health prober panicked")]
    Panicked,
}

/// Outcome of one health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub available: bool,
    /// Measured round-trip time, 0 if not measured
    pub latency_ms: u64,
    /// Present iff `available` is false
    pub error: Option<String>,
    /// Unix timestamp millis
    pub observed_at: u64,
}

impl ProbeResult {
    pub fn success(latency_ms: u64) -> Self {
        Self {
            available: true,
            latency_ms,
            error: None,
            observed_at: current_time_millis(),
        }
    }

    pub fn failure(error: &ProbeError, latency_ms: u64) -> Self {
        Self {
            available: false,
            latency_ms,
            error: Some(error.to_string()),
            observed_at: current_time_millis(),
        }
    }
}

/// One bounded-time reachability check against the monitored dependency.
///
/// Implementations must enforce `timeout` themselves and fold every transport
/// error into the result. The controller records a panicking prober as a
/// failed check.
#[async_trait]
pub trait HealthProber: Send + Sync {
    async fn probe(&self, timeout: Duration) -> ProbeResult;
}

/// Probes a health-check URL with a single GET request
pub struct HttpProber {
    url: String,
    client: Client,
}

impl HttpProber {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("uplink-health-prober/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    async fn perform_http_check(&self) -> Result<(), ProbeError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        let status = response.status();
        // Body is diagnostic only
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Protocol(status.as_u16()))
        }
    }
}

#[async_trait]
impl HealthProber for HttpProber {
    async fn probe(&self, check_timeout: Duration) -> ProbeResult {
        let started = Instant::now();
        let outcome = match timeout(check_timeout, self.perform_http_check()).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(check_timeout)),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                debug!(url = %self.url, latency_ms, "Health probe succeeded");
                ProbeResult::success(latency_ms)
            }
            Err(e) => {
                debug!(url = %self.url, latency_ms, error = %e, "Health probe failed");
                ProbeResult::failure(&e, latency_ms)
            }
        }
    }
}
