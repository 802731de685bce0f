use crate::health::{ConnectionState, Mode, ProbeResult};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!("uplink_probes_total", "Total number of health probes performed");
    describe_histogram!(
        "uplink_probe_duration_seconds",
        "Health probe round-trip time in seconds"
    );
    describe_gauge!(
        "uplink_dependency_status",
        "Dependency status (0=unknown, 1=checking, 2=available, 3=unavailable, 4=exhausted)"
    );
    describe_gauge!("uplink_attempt_count", "Consecutive failed probes");
    describe_gauge!("uplink_fallback_mode", "Fallback mode active (1=fallback, 0=live)");
}

/// Start Prometheus metrics server on given address
pub fn start_metrics_server(addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: std::net::SocketAddr = addr.parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    init_metrics();

    Ok(())
}

pub struct Metrics;

impl Metrics {
    /// Record the outcome of one probe
    #[inline]
    pub fn record_probe(result: &ProbeResult) {
        let outcome = if result.available { "success" } else { "failure" };
        counter!("uplink_probes_total", "result" => outcome).increment(1);
        histogram!("uplink_probe_duration_seconds")
            .record(Duration::from_millis(result.latency_ms).as_secs_f64());
    }

    /// Mirror a published connection state into gauges
    #[inline]
    pub fn record_state(state: &ConnectionState) {
        gauge!("uplink_dependency_status").set(state.status.code() as f64);
        gauge!("uplink_attempt_count").set(state.attempt_count as f64);
        gauge!("uplink_fallback_mode").set(if state.mode == Mode::Fallback { 1.0 } else { 0.0 });
    }
}
