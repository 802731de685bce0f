use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use uplink::admin::{AdminApi, AdminServer};
use uplink::config::Config;
use uplink::health::{ConnectionController, ConnectionState};
use uplink::metrics::{self, Metrics};
use uplink::service::DataSourceRouter;

#[derive(Parser, Debug)]
#[command(name = "uplink")]
#[command(about = "Connectivity resilience controller for a remote dependency")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Start in fallback mode regardless of configuration
    #[arg(long)]
    fallback: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(args.json_logs.then(|| fmt::layer().json()))
        .with((!args.json_logs).then(|| fmt::layer()))
        .init();

    info!("Loading configuration from {:?}", args.config);

    let mut config = Config::load(&args.config)?;
    if args.fallback {
        config.monitor.start_in_fallback = true;
    }

    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    // Start metrics server if configured
    if let Some(ref metrics_config) = config.metrics {
        info!("Starting Prometheus metrics server on {}", metrics_config.address);
        if let Err(e) = metrics::start_metrics_server(&metrics_config.address) {
            warn!("Failed to start metrics server: {}. Continuing without metrics.", e);
        }
    }

    let controller = Arc::new(ConnectionController::from_config(&config.monitor)?);
    let router = Arc::new(DataSourceRouter::new(&config.sources, &controller));
    let (live_source, fallback_source) = router.source_names();
    info!(live = live_source, fallback = fallback_source, "Data sources configured");

    Metrics::record_state(&controller.snapshot());
    let _metrics_subscription = controller.subscribe(Metrics::record_state);
    let _log_subscription = controller.subscribe(transition_logger(controller.snapshot()));

    let (shutdown_tx, _) = broadcast::channel(1);

    let admin_task = match &config.admin {
        Some(admin) => {
            let address: SocketAddr = admin
                .address
                .parse()
                .with_context(|| format!("Invalid admin address: {}", admin.address))?;
            let api = AdminApi::new(Arc::clone(&controller), Arc::clone(&router));
            Some(tokio::spawn(
                AdminServer::new(api, address).run(shutdown_tx.subscribe()),
            ))
        }
        None => None,
    };

    info!(url = controller.health_check_url(), "Starting uplink");

    let available = controller.check_availability(false).await;
    info!(
        available,
        source = router.active_name(),
        "Initial availability check complete"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
    controller.dispose();

    if let Some(task) = admin_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Admin API error: {}", e),
            Err(e) => error!("Admin API task failed: {}", e),
        }
    }

    Ok(())
}

/// Logs status and mode changes; repeated publications of the same
/// status (e.g. backoff bookkeeping) are skipped
fn transition_logger(initial: ConnectionState) -> impl Fn(&ConnectionState) + Send + Sync + 'static {
    let last = Mutex::new((initial.status, initial.mode));
    move |state: &ConnectionState| {
        let mut last = last.lock();
        if *last == (state.status, state.mode) {
            return;
        }
        *last = (state.status, state.mode);
        info!(
            status = %state.status,
            mode = %state.mode,
            attempt = state.attempt_count,
            last_error = state.last_error.as_deref().unwrap_or("-"),
            "Connection state changed"
        );
    }
}
