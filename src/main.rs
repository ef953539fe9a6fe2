use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use droplimit::config::{DroplimitConfig, LoggingConfig};
use droplimit::gate::{with_limiter, RateLimitGate};

/// Drive a local rate limiter with a synthetic request stream.
#[derive(Debug, Parser)]
#[command(name = "droplimit", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of requests to send
    #[arg(short = 'n', long, default_value_t = 30)]
    requests: u64,

    /// Pause between two requests of one worker in milliseconds
    #[arg(long, default_value_t = 0)]
    spacing_ms: u64,

    /// Number of concurrent workers sharing the requests
    #[arg(short, long, default_value_t = 1)]
    workers: u64,

    /// Emit JSON formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DroplimitConfig::from_file(path)?,
        None => DroplimitConfig::default(),
    };

    init_tracing(&config.logging, args.json);

    info!("Starting droplimit");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let limiter = Arc::new(config.limiter.build()?);
    info!(
        target_rate = limiter.target_rate(),
        wake_interval_ms = limiter.wake_interval().as_millis() as u64,
        wait_timeout_ms = limiter.wait_timeout().as_millis() as u64,
        max_tokens = limiter.max_tokens(),
        "Rate limiter initialized"
    );

    let gate = Arc::new(RateLimitGate::new(vec![with_limiter(limiter.clone())])?);

    let started = Instant::now();
    tokio::select! {
        _ = send_requests(gate.clone(), &args) => {}
        _ = shutdown_signal() => {
            warn!("Interrupted, stopping early");
        }
    }
    let took = started.elapsed();

    limiter.shutdown().await;

    let stats = gate.stats();
    info!(
        forwarded = stats.forwarded,
        throttled = stats.throttled,
        elapsed_ms = took.as_millis() as u64,
        "Run finished"
    );
    println!(
        "forwarded {} of {} requests in {:.3}s",
        stats.forwarded,
        stats.forwarded + stats.throttled,
        took.as_secs_f64()
    );

    Ok(())
}

fn init_tracing(logging: &LoggingConfig, force_json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json || force_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Split the requests over the workers and run them to completion.
async fn send_requests<L>(gate: Arc<RateLimitGate<L>>, args: &Args)
where
    L: droplimit::ratelimit::Limiter + ?Sized + 'static,
{
    let workers = args.workers.max(1);
    let spacing = Duration::from_millis(args.spacing_ms);

    let mut handles = Vec::with_capacity(workers as usize);
    for worker in 0..workers {
        let share = args.requests / workers + u64::from(worker < args.requests % workers);
        let gate = gate.clone();

        handles.push(tokio::spawn(async move {
            for request in 0..share {
                let decision = gate.check().await;
                debug!(
                    worker = worker,
                    request = request,
                    status = decision.status_code(),
                    "Request processed"
                );
                if !spacing.is_zero() {
                    tokio::time::sleep(spacing).await;
                }
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Worker task failed");
        }
    }
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
            Ok(mut stream) => {
                stream.recv().await;
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
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
