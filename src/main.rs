//! Geofence trigger service
//!
//! Consumes order location events over MQTT, evaluates them against the
//! store's geofences, keeps the latest snapshot on each order and publishes a
//! trigger notification whenever geofence containment changes.
//!
//! Module structure:
//! - `domain/` - Core types (Order, Geofence, snapshots, geometry)
//! - `io/` - External interfaces (MQTT ingest, trigger publishers, repository)
//! - `services/` - Business logic (Evaluator, Trigger detector, Orchestrator)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use anyhow::Context;
use clap::Parser;
use geofence_trigger::infra::{Config, Metrics};
use geofence_trigger::io::{JsonlWriter, MemoryRepository, MqttTriggerPublisher, SeedData};
use geofence_trigger::services::{create_event_pipeline, Orchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Geofence trigger service
#[derive(Parser, Debug)]
#[command(name = "geofence-trigger", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "geofence-trigger starting");

    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config);
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        service_id = %config.service_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        events_topic = %config.mqtt_events_topic(),
        trigger_topic = %config.trigger_topic(),
        default_order_status = %config.default_order_status(),
        seed_file = %config.seed_file(),
        max_in_flight = %config.max_in_flight(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    if config.broker_enabled() {
        geofence_trigger::infra::broker::start_embedded_broker(&config)?;
    }

    // Reference data and order state
    let seed = SeedData::from_file(config.seed_file())?;
    let mut repository = MemoryRepository::from_seed(seed);
    if let Some(path) = config.event_log() {
        info!(path = %path, "event_log_enabled");
        repository = repository.with_event_log(JsonlWriter::new(path));
    }
    let repository = Arc::new(repository);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let publisher = Arc::new(MqttTriggerPublisher::new(&config));

    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        repository,
        publisher.clone(),
        metrics.clone(),
    ));
    let (event_tx, pipeline) =
        create_event_pipeline(orchestrator, config.channel_capacity(), config.max_in_flight());
    let pipeline_handle = tokio::spawn(pipeline.run());

    // Ingest owns the only sender; when it returns the pipeline drains
    let ingest_config = config.clone();
    let ingest_metrics = metrics.clone();
    let ingest_shutdown = shutdown_rx.clone();
    let ingest_handle = tokio::spawn(async move {
        if let Err(e) = geofence_trigger::io::mqtt::start_mqtt_ingest(
            &ingest_config,
            event_tx,
            ingest_metrics,
            ingest_shutdown,
        )
        .await
        {
            error!(error = %e, "mqtt_ingest_failed");
        }
    });

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_service = config.service_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = geofence_trigger::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_service,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "prometheus_server_failed");
            }
        });
    }

    // Periodic metrics log line
    let reporter_metrics = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let mut reporter_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            tokio::select! {
                _ = interval.tick() => reporter_metrics.report().log(),
                _ = reporter_shutdown.changed() => {
                    if *reporter_shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    });

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    ingest_handle.await.context("MQTT ingest task panicked")?;
    let stats = pipeline_handle.await.context("Event pipeline task panicked")?;
    publisher.disconnect().await;
    metrics.report().log();

    info!(
        dispatched = %stats.dispatched,
        applied = %stats.applied,
        triggered = %stats.triggered,
        "geofence-trigger shutdown complete"
    );
    Ok(())
}
