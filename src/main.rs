use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ipthrottle::clock::SystemClock;
use ipthrottle::config::{ConfigOverrides, LoggingConfig, ThrottleConfig};
use ipthrottle::handler::RequestHandler;
use ipthrottle::ratelimit::FixedWindowLimiter;
use ipthrottle::store::MemoryStore;

/// Throttle client addresses read from stdin, one per line.
///
/// Each input line is treated as one request from that client; the
/// matching response is written to stdout as `STATUS BODY`.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the per-window request limit
    #[arg(long)]
    limit: Option<u64>,

    /// Override the window length in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        limit: args.limit,
        window_secs: args.window_secs,
        json_logs: args.json_logs,
    };
    let config = ThrottleConfig::load_with_overrides(args.config.as_deref(), &overrides)?;

    init_tracing(&config.logging);

    info!("Starting ipthrottle");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        limit = config.rate_limiting.limit,
        window_secs = config.rate_limiting.window_secs,
        failure_policy = ?config.rate_limiting.failure_policy,
        alignment = ?config.rate_limiting.alignment,
        "Configuration loaded"
    );

    let clock = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let sweeper = store.spawn_sweeper(config.sweep_interval());
    let limiter = Arc::new(FixedWindowLimiter::new(store, config.limiter_settings()));
    let handler = RequestHandler::new(limiter, clock);

    tokio::select! {
        result = serve_lines(&handler) => result?,
        _ = shutdown_signal() => {}
    }

    sweeper.abort();
    info!("ipthrottle stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // stdout carries responses, so logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve_lines(handler: &RequestHandler<MemoryStore>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let client_ip = line.trim();
        if client_ip.is_empty() {
            warn!("Skipping blank input line");
            continue;
        }

        let response = handler.handle(client_ip).await;
        stdout.write_all(format!("{}\n", response).as_bytes()).await?;
        stdout.flush().await?;
    }

    info!("Input closed");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
