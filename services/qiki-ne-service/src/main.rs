//! QIKI Neural Engine Service
//!
//! Runs the decision pipeline over a stream of agent contexts.
//!
//! # Protocol
//!
//! - Input: one JSON `AgentContext` per line, from a file or stdin
//! - Output: one JSON array of approved proposals per line, on stdout
//! - Logs go to stderr; decision traces go to NATS or the log
//!
//! # Usage
//!
//! ```bash
//! # Read contexts from stdin with default settings
//! qiki-ne < contexts.jsonl
//!
//! # Start with custom config and publish traces to NATS
//! qiki-ne --config /path/to/config.toml --nats-url nats://localhost:4222
//!
//! # Start with environment overrides
//! QIKI__PIPELINE__TIME_BUDGET_MS=12 qiki-ne --input contexts.jsonl
//!
//! # Print the effective configuration and exit
//! qiki-ne --dry-config
//! ```

mod config;

use std::future::Future;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use qiki_engine::{
    EngineConfig, EngineObserver, MetricsObserver, NeuralEngine, NoopObserver, StaticScorer,
};
use qiki_telemetry::{LogTransport, NatsTransport, TelemetryPublisher, TraceTransport};
use qiki_types::AgentContext;

use crate::config::ServiceConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// QIKI Neural Engine - proposal generation over a JSON-lines context stream
#[derive(Parser, Debug)]
#[command(name = "qiki-ne")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "QIKI_CONFIG")]
    config: Option<String>,

    /// Read contexts from this file instead of stdin
    #[arg(short, long, env = "QIKI_INPUT")]
    input: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "QIKI_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "QIKI_LOG_FORMAT")]
    log_format: Option<String>,

    /// NATS server URL for decision traces
    #[arg(long, env = "QIKI_NATS_URL")]
    nats_url: Option<String>,

    /// Disable decision trace publication
    #[arg(long)]
    no_telemetry: bool,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "QIKI_METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Validate and print the effective configuration, then exit
    #[arg(long)]
    dry_config: bool,
}

impl Args {
    /// Override file and environment values with CLI arguments
    fn apply(&self, config: &mut ServiceConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
        if let Some(url) = &self.nats_url {
            config.telemetry.nats_url = Some(url.clone());
        }
        if self.no_telemetry {
            config.telemetry.enabled = false;
        }
        if let Some(port) = self.metrics_port {
            config.metrics.enabled = true;
            config.metrics.port = port;
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut service_config = ServiceConfig::load(args.config.as_deref())?;
    args.apply(&mut service_config);

    if args.dry_config {
        service_config.validate()?;
        println!("{}", serde_json::to_string_pretty(&service_config)?);
        return Ok(());
    }

    init_logging(&service_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting QIKI neural engine service"
    );

    service_config.validate()?;

    let observer: Arc<dyn EngineObserver> = if service_config.metrics.enabled {
        start_metrics_exporter(&service_config.metrics)?;
        Arc::new(MetricsObserver::new())
    } else {
        Arc::new(NoopObserver)
    };

    let publisher = init_telemetry(&service_config.telemetry)?;
    let engine = Arc::new(build_engine(&service_config, observer, publisher.clone())?);

    tracing::info!(
        actions = engine.catalog().len(),
        time_budget_ms = engine.config().time_budget_ms,
        "Engine ready"
    );

    let mut stdout = tokio::io::stdout();
    let stats = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            process_stream(&engine, BufReader::new(file), &mut stdout, shutdown_signal()).await?
        }
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            process_stream(&engine, stdin, &mut stdout, shutdown_signal()).await?
        }
    };

    tracing::info!(
        cycles = stats.cycles,
        rejected_lines = stats.rejected_lines,
        "Input finished"
    );

    if let Some(publisher) = publisher {
        let publisher_ref = Arc::clone(&publisher);
        tokio::task::spawn_blocking(move || publisher_ref.shutdown()).await?;
        tracing::info!(
            delivered = publisher.delivered(),
            failed = publisher.failed(),
            dropped = publisher.dropped(),
            "Telemetry publisher stopped"
        );
    }

    tracing::info!("Service shutdown complete");

    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging on stderr
fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
                .try_init()?;
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true).with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}

/// Start Prometheus metrics exporter
fn start_metrics_exporter(config: &config::MetricsConfig) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(%addr, "Metrics exporter started");
    Ok(())
}

/// Spawn the trace publisher, preferring NATS over the log
fn init_telemetry(
    settings: &config::TelemetrySettings,
) -> anyhow::Result<Option<Arc<TelemetryPublisher>>> {
    if !settings.enabled {
        tracing::info!("Telemetry disabled");
        return Ok(None);
    }

    let transport: Box<dyn TraceTransport> = match &settings.nats_url {
        Some(url) => match NatsTransport::connect(url, settings.subject.clone()) {
            Ok(transport) => Box::new(transport),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    url = %url,
                    "NATS unavailable, publishing traces to the log instead"
                );
                Box::new(LogTransport)
            }
        },
        None => Box::new(LogTransport),
    };

    tracing::info!(
        transport = transport.name(),
        capacity = settings.queue_capacity,
        "Starting telemetry publisher"
    );

    let publisher = TelemetryPublisher::spawn(transport, settings.queue_capacity)?;
    Ok(Some(Arc::new(publisher)))
}

fn build_engine(
    config: &ServiceConfig,
    observer: Arc<dyn EngineObserver>,
    publisher: Option<Arc<TelemetryPublisher>>,
) -> anyhow::Result<NeuralEngine> {
    let scorer = StaticScorer::new(
        config.scorer.scores.clone(),
        config.scorer.priority,
        config.scorer.params.clone(),
    );

    let mut engine_config = EngineConfig::new(
        config.pipeline.clone(),
        Arc::new(config.catalog.clone()),
        Box::new(scorer),
    )
    .with_observer(observer);
    if let Some(publisher) = publisher {
        engine_config = engine_config.with_telemetry(publisher);
    }

    Ok(NeuralEngine::new(engine_config)?)
}

// =============================================================================
// Decision Loop
// =============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct StreamStats {
    cycles: u64,
    rejected_lines: u64,
}

/// Run one decision cycle per input line until end of input or shutdown
async fn process_stream<R, W, S>(
    engine: &Arc<NeuralEngine>,
    reader: R,
    writer: &mut W,
    shutdown: S,
) -> anyhow::Result<StreamStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = reader.lines();
    let mut stats = StreamStats::default();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut shutdown => break,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let context = match serde_json::from_str::<AgentContext>(&line) {
            Ok(context) => Some(context),
            Err(err) => {
                tracing::warn!(error = %err, "Unparsable context line, emitting no proposals");
                stats.rejected_lines += 1;
                None
            }
        };

        let output = match context {
            Some(context) => {
                let engine = Arc::clone(engine);
                let proposals =
                    tokio::task::spawn_blocking(move || engine.generate_proposals(&context)).await?;
                stats.cycles += 1;
                serde_json::to_string(&proposals)?
            }
            None => "[]".to_string(),
        };

        writer.write_all(output.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(stats)
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping decision loop");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping decision loop");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
