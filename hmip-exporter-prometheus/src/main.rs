//! Prometheus exporter for HomematicIP Cloud device state.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use hmip_client::CloudClient;
use hmip_common::client::HomeClient;
use hmip_exporter_prometheus::config::DEFAULT_CONFIG_PATH;
use hmip_exporter_prometheus::{
    EventAdapter, ExporterConfig, HttpServer, MetricRegistry, Synchronizer,
};

/// Export HomematicIP Cloud device state as Prometheus metrics.
#[derive(Parser, Debug)]
#[command(name = "hmip-exporter-prometheus")]
#[command(about = "Export HomematicIP Cloud device state as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Port to expose the metrics on (overrides config).
    #[arg(long)]
    metric_port: Option<u16>,

    /// Collection interval in seconds (overrides config).
    #[arg(long)]
    collect_interval_seconds: Option<u64>,

    /// HomematicIP auth token (together with --access-point, takes
    /// precedence over the config file credentials).
    #[arg(long)]
    auth_token: Option<String>,

    /// HomematicIP access point id.
    #[arg(long)]
    access_point: Option<String>,

    /// Maintain push-path event metrics.
    #[arg(long)]
    event_metrics: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> anyhow::Result<ExporterConfig> {
    // The config file is optional when credentials come from the CLI; the
    // default path usually does not exist on development machines.
    let mut config = if std::path::Path::new(&args.config).exists() {
        ExporterConfig::load_from_file(&args.config)?
    } else if args.config != DEFAULT_CONFIG_PATH {
        anyhow::bail!("Config file '{}' not found", args.config);
    } else {
        ExporterConfig::default()
    };

    if let Some(port) = args.metric_port {
        config.prometheus.listen = format!("0.0.0.0:{}", port);
    }
    if let Some(secs) = args.collect_interval_seconds {
        config.poll.interval_secs = secs;
    }
    if let (Some(token), Some(access_point)) = (&args.auth_token, &args.access_point) {
        config.cloud.auth_token = token.clone();
        config.cloud.access_point_id = access_point.clone();
    }
    if args.event_metrics {
        config.events.enabled = true;
    }
    config.logging.level = args.log_level.clone();

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    hmip_common::init_tracing(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        config = %args.config,
        listen = %config.prometheus.listen,
        interval_secs = config.poll.interval_secs,
        "Starting HomematicIP Prometheus exporter"
    );

    let registry = Arc::new(MetricRegistry::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Startup failures are fatal: exit non-zero instead of degrading.
    let client: Arc<dyn HomeClient> = match CloudClient::connect(&config.cloud).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Initializing HomematicIP client failed");
            std::process::exit(1);
        }
    };

    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let http_server = match HttpServer::bind(
        registry.clone(),
        listen_addr,
        config.prometheus.path.clone(),
    )
    .await
    {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, port = %listen_addr.port(), "Starting the http server failed");
            std::process::exit(1);
        }
    };

    // Push path, only if event metrics are enabled.
    if config.events.enabled {
        let rx = match client.subscribe_changes(config.events.channel_buffer).await {
            Ok(rx) => rx,
            Err(e) => {
                error!(error = %e, "Subscribing to change notifications failed");
                std::process::exit(1);
            }
        };

        let adapter = EventAdapter::new(registry.clone(), rx);
        let event_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            adapter.run(event_shutdown).await;
        });
    }

    // Poll path.
    let synchronizer = Synchronizer::new(client, registry.clone());
    let interval = Duration::from_secs(config.poll.interval_secs);
    let poll_shutdown = shutdown_rx.clone();
    let poll_task = tokio::spawn(async move {
        synchronizer.run(interval, poll_shutdown).await;
    });

    // Scrape endpoint.
    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!(error = %e, "HTTP server error");
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate()
                ).expect("failed to install SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for tasks to complete
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = poll_task.await;
        let _ = http_task.await;
    })
    .await;

    // Print final stats
    let stats = registry.stats();
    info!(
        polls = stats.polls_total,
        poll_failures = stats.polls_failed,
        devices_processed = stats.devices_processed,
        device_failures = stats.device_failures,
        events_applied = stats.events_applied,
        series_count = registry.series_count(),
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}
