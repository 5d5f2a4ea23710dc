use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use rollup_metrics::backends::LogSink;
use rollup_metrics::config::{BackendKind, MetricsConfig};
use rollup_metrics::{load_generator, MetricsClient};

/// Drive synthetic metrics through the configured backend.
#[derive(Parser)]
#[command(name = "rollup-metrics", about)]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the configured backend (immediate or rollup).
    #[arg(long)]
    backend: Option<String>,

    /// Override the rollup window length in seconds.
    #[arg(long)]
    window_seconds: Option<u64>,

    /// Number of concurrent producer tasks.
    #[arg(long, default_value_t = 4)]
    concurrency: u32,

    /// How long the producers run (seconds).
    #[arg(long, default_value_t = 15)]
    duration_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── 1. Logging ───────────────────────────────────────────────
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;
    fmt().with_env_filter(filter).with_target(true).init();

    // ── 2. Configuration ─────────────────────────────────────────
    let mut cfg = match &cli.config {
        Some(path) => MetricsConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => MetricsConfig::default(),
    };
    if let Some(backend) = &cli.backend {
        cfg.backend = match backend.as_str() {
            "immediate" => BackendKind::Immediate,
            "rollup" => BackendKind::Rollup,
            other => anyhow::bail!("unknown backend {other:?} (expected immediate or rollup)"),
        };
    }
    if let Some(secs) = cli.window_seconds {
        cfg.window_seconds = secs;
    }

    // ── 3. Backend + client ──────────────────────────────────────
    let backend = cfg
        .build_backend(Arc::new(LogSink))
        .context("building metrics backend")?;
    let metrics = MetricsClient::new(cfg.prefix.clone()).with_backend(backend.backend());

    tracing::info!(
        backend = ?cfg.backend,
        window_seconds = cfg.window_seconds,
        concurrency = cli.concurrency,
        duration_secs = cli.duration_secs,
        "starting load generator"
    );

    // ── 4. Run until the deadline or Ctrl-C ──────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let load = tokio::spawn(load_generator::run(
        running.clone(),
        metrics,
        cli.concurrency,
        cli.duration_secs,
    ));

    let ctrl_c_flag = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received SIGINT, shutting down");
            ctrl_c_flag.store(false, Ordering::SeqCst);
        }
    });

    let emitted = load.await.context("load generator task failed")?;

    // ── 5. Final flush ───────────────────────────────────────────
    backend.stop().await;
    tracing::info!(emitted, "rollup-metrics stopped");

    Ok(())
}
