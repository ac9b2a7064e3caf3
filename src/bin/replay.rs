//! Geofence Replay - offline event replay through the orchestrator
//!
//! Loads a seed file, feeds a JSONL file of location events through the same
//! orchestrator the service uses, and writes every trigger notification to a
//! JSONL file instead of MQTT. Events are processed strictly in file order.
//!
//! Usage:
//!   geofence-replay --events events.jsonl
//!   geofence-replay --config config/dev.toml --seed config/stores.json \
//!       --events events.jsonl --triggers out/triggers.jsonl

use anyhow::Context;
use clap::Parser;
use geofence_trigger::infra::{Config, Metrics};
use geofence_trigger::io::mqtt::parse_incoming_events;
use geofence_trigger::io::{JsonlTriggerPublisher, JsonlWriter, MemoryRepository, SeedData};
use geofence_trigger::services::{EventOutcome, Orchestrator};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Geofence Replay - run recorded events through geofence evaluation
#[derive(Parser, Debug)]
#[command(name = "geofence-replay", version, about, long_about = None)]
struct Args {
    /// Path to TOML configuration file
    ///
    /// Only the orders, trigger and pipeline sections affect a replay.
    #[arg(short, long)]
    config: Option<String>,

    /// Seed file with stores, geofences and orders (default: repository.seed_file)
    #[arg(short, long)]
    seed: Option<String>,

    /// JSONL file of events, one event object (or array of events) per line
    #[arg(short, long)]
    events: String,

    /// Output file for trigger notifications
    #[arg(short, long, default_value = "triggers.jsonl")]
    triggers: String,
}

#[derive(Debug, Default)]
struct ReplaySummary {
    lines: usize,
    invalid: usize,
    applied: usize,
    triggered: usize,
    stale: usize,
    failed: usize,
}

impl ReplaySummary {
    fn record(&mut self, outcome: &EventOutcome) {
        match outcome {
            EventOutcome::Applied { triggered, .. } => {
                self.applied += 1;
                self.triggered += usize::from(*triggered);
            }
            EventOutcome::RejectedStale { .. } => self.stale += 1,
            EventOutcome::Failed(_) => self.failed += 1,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config);
    let config = Config::load_from_path(&config_path);
    let seed_path = args.seed.unwrap_or_else(|| config.seed_file().to_string());

    let repository = Arc::new(MemoryRepository::from_seed(SeedData::from_file(&seed_path)?));
    let publisher = Arc::new(JsonlTriggerPublisher::new(JsonlWriter::new(&args.triggers)));
    let orchestrator = Orchestrator::new(
        &config,
        repository.clone(),
        publisher,
        Arc::new(Metrics::new()),
    );

    let file = File::open(&args.events)
        .with_context(|| format!("Failed to open events file {}", args.events))?;
    info!(events = %args.events, seed = %seed_path, triggers = %args.triggers, "replay_started");

    let mut summary = ReplaySummary::default();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", args.events))?;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;

        let parsed = parse_incoming_events(&line);
        if parsed.invalid > 0 {
            warn!(line = %(index + 1), invalid = %parsed.invalid, "replay_line_invalid");
            summary.invalid += parsed.invalid;
        }
        for event in parsed.events {
            let outcome = orchestrator.handle_event(&event).await;
            summary.record(&outcome);
        }
    }

    println!("Replay of {}", args.events);
    println!("  lines:      {}", summary.lines);
    println!("  invalid:    {}", summary.invalid);
    println!("  applied:    {}", summary.applied);
    println!("  triggered:  {}", summary.triggered);
    println!("  stale:      {}", summary.stale);
    println!("  failed:     {}", summary.failed);
    println!("  orders:     {}", repository.order_count());
    println!("Triggers written to {}", args.triggers);

    Ok(())
}
