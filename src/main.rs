//! Conversion Gateway - Main Entry Point
//!
//! Reads newline-delimited JSON tracking events, scores and prices each one,
//! dispatches it to the enabled ad platforms and prints one JSON result line
//! per event.

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use conversion_gateway::common::channels::create_event_channel;
use conversion_gateway::common::traits::{
    SharedAnalyticsSink, SharedPredictionSource, SharedRateLimitStore,
};
use conversion_gateway::config::load_config;
use conversion_gateway::storage::{
    connect, ensure_schema, InMemoryAnalyticsSink, InMemoryPredictionSource,
    InMemoryRateLimitStore, PostgresAnalyticsSink, PostgresPredictionSource,
    PostgresRateLimitStore,
};
use conversion_gateway::{AppConfig, Gateway, InboundEvent, PlatformRegistry, RetryPolicy};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// NDJSON event source; "-" reads stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Log level (trace, debug, info, warn, error); overrides settings.log_level
    #[arg(long, env = "GATEWAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Use in-memory storage instead of the database
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let bootstrap_level = args.log_level.as_deref().unwrap_or("info");
    let config = load_config_logged(&args.config, bootstrap_level, std::io::stderr)?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    init_tracing(&level, args.json_logs)?;

    info!("Starting conversion gateway");
    info!(config = %args.config, input = %args.input, dry_run = args.dry_run, "Configuration loaded");

    let gateway = Arc::new(build_gateway(&config, args.dry_run).await?);
    let sweeper = gateway.spawn_rate_limit_sweeper();
    let policy = config.settings.retry_policy();

    let (tx, rx) = create_event_channel();
    let reader = tokio::spawn(read_events(args.input.clone(), tx));

    tokio::select! {
        _ = process_events(Arc::clone(&gateway), rx, config.settings.max_in_flight, policy) => {
            gateway.settle_deliveries().await;
            info!("Input exhausted, all events settled");
            reader.await??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, cleaning up...");
            reader.abort();
        }
    }

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    Ok(())
}

/// Load configuration under a temporary subscriber so loader logs are kept
///
/// The real subscriber depends on the configured log level, so it can only
/// be installed afterwards.
fn load_config_logged<W>(path: &str, level: &str, writer: W) -> Result<AppConfig>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true)
        .finish();

    tracing::subscriber::with_default(bootstrap, || load_config(Some(path)))
        .context("failed to load configuration")
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

async fn build_gateway(config: &AppConfig, dry_run: bool) -> Result<Gateway> {
    let registry = PlatformRegistry::from_config(&config.platform)?;
    if registry.is_empty() {
        warn!("No platforms enabled, events will only be recorded");
    }

    let (sink, predictions, rate_limits): (
        SharedAnalyticsSink,
        SharedPredictionSource,
        SharedRateLimitStore,
    ) = if dry_run {
        info!("Dry run: using in-memory storage");
        (
            Arc::new(InMemoryAnalyticsSink::new()),
            Arc::new(InMemoryPredictionSource::new()),
            Arc::new(InMemoryRateLimitStore::new()),
        )
    } else {
        let Some(database) = &config.database else {
            bail!("database configuration is required unless --dry-run is set");
        };
        let pool = connect(database).await?;
        ensure_schema(&pool).await?;
        (
            Arc::new(PostgresAnalyticsSink::new(pool.clone())),
            Arc::new(PostgresPredictionSource::new(pool.clone())),
            Arc::new(PostgresRateLimitStore::new(pool)),
        )
    };

    Ok(Gateway::new(config, registry.into_adapters(), sink)
        .with_prediction_source(predictions)
        .with_rate_limit_store(rate_limits))
}

async fn read_events(input: String, tx: mpsc::Sender<InboundEvent>) -> Result<()> {
    if input == "-" {
        forward_lines(BufReader::new(tokio::io::stdin()), tx).await
    } else {
        let file = tokio::fs::File::open(&input)
            .await
            .with_context(|| format!("failed to open input {}", input))?;
        forward_lines(BufReader::new(file), tx).await
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<InboundEvent>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_number = 0u64;
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundEvent>(&line) {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(line = line_number, error = %e, "Skipping malformed input line");
                print_line(&serde_json::json!({ "line": line_number, "error": e.to_string() }));
            }
        }
    }
    Ok(())
}

async fn process_events(
    gateway: Arc<Gateway>,
    rx: mpsc::Receiver<InboundEvent>,
    max_in_flight: usize,
    policy: RetryPolicy,
) {
    let events = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|e| (e, rx)) });

    events
        .for_each_concurrent(max_in_flight.max(1), |event| {
            let gateway = Arc::clone(&gateway);
            async move {
                let event_id = event.event_id.clone();
                match gateway.process_with_retry(event, &policy).await {
                    Ok(response) => print_line(&response),
                    Err(e) => {
                        error!(event_id = event_id.as_deref().unwrap_or(""), error = %e, "Event failed");
                        print_line(&serde_json::json!({
                            "event_id": event_id,
                            "error": e.to_string(),
                            "retryable": e.is_retryable(),
                        }));
                    }
                }
            }
        })
        .await;
}

fn print_line<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => error!(error = %e, "Failed to serialize output line"),
    }
}
