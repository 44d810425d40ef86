use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bulwark::clock::{Clock, SystemClock};
use bulwark::config::{retention_period, BulwarkConfig, LogFormat, LoggingConfig};
use bulwark::error::BulwarkError;
use bulwark::gateway::{GatewayOptions, GatewayService, GrpcServer};
use bulwark::keys::{FileKeyStore, KeyRotationManager};
use bulwark::ratelimit::{LimitConfig, RateLimiter};
use bulwark::retention::{FileRecordStore, RetentionManager};

#[derive(Parser)]
#[command(name = "bulwark", version, about = "Security gateway for AI endpoints")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gRPC gateway (default)
    Serve,
    /// Rotate the API key if the rotation interval has elapsed
    RotateKey,
    /// Delete user records older than the retention threshold
    Purge {
        /// Override the configured maximum age
        #[arg(long)]
        max_age_days: Option<i64>,
    },
    /// Print one user's stored record as JSON
    Export { user_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = BulwarkConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    let clock = Arc::new(SystemClock);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, clock).await?,
        Command::RotateKey => {
            let outcome = key_manager(&config)?.rotate_if_due(clock.now()).await?;
            println!(
                "{}",
                serde_json::json!({
                    "rotated": outcome.rotated,
                    "last_rotated": outcome.last_rotated,
                })
            );
        }
        Command::Purge { max_age_days } => {
            let retention = retention_manager(&config)?;
            let max_age = match max_age_days {
                Some(days) => retention_period(days)
                    .map_err(|e| anyhow::anyhow!("--max-age-days: {e}"))?,
                None => retention.max_age(),
            };
            let report = retention.purge_expired(clock.now(), max_age).await?;
            println!("Deleted {} of {} records ({} failed)", report.deleted, report.scanned, report.failed);
        }
        Command::Export { user_id } => match retention_manager(&config)?.export(&user_id).await {
            Ok(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            Err(BulwarkError::NotFound(_)) => {
                eprintln!("No data found for user: {user_id}");
                return Ok(ExitCode::FAILURE);
            }
            Err(e) => return Err(e.into()),
        },
    }

    Ok(ExitCode::SUCCESS)
}

async fn serve(config: BulwarkConfig, clock: Arc<SystemClock>) -> anyhow::Result<()> {
    info!("Starting Bulwark Security Gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(grpc_addr = %config.server.grpc_addr, "Configuration loaded");

    let rate_limiter = Arc::new(RateLimiter::with_config(LimitConfig {
        limit: config.rate_limiting.requests_per_window,
        window: config.window()?,
    }));
    info!(
        limit = config.rate_limiting.requests_per_window,
        window_secs = config.rate_limiting.window_secs,
        "Rate limiter initialized"
    );

    let keys = Arc::new(key_manager(&config)?);
    // Create the key record up front so the first request does not pay for it.
    keys.rotate_if_due(clock.now()).await?;

    let service = GatewayService::new(
        rate_limiter,
        keys,
        Arc::new(retention_manager(&config)?),
        clock,
        GatewayOptions {
            trust_forwarded_for: config.server.trust_forwarded_for,
            max_tracked_clients: config.rate_limiting.max_tracked_clients,
        },
    );

    let grpc_server = GrpcServer::new(config.server.grpc_addr, service);

    info!("Starting gRPC server on {}", config.server.grpc_addr);

    // Run the server with graceful shutdown on Ctrl+C
    grpc_server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Bulwark Security Gateway stopped");
    Ok(())
}

fn key_manager(config: &BulwarkConfig) -> bulwark::error::Result<KeyRotationManager> {
    Ok(KeyRotationManager::with_interval(
        Arc::new(FileKeyStore::new(&config.keys.path)),
        config.rotation_interval()?,
    ))
}

fn retention_manager(config: &BulwarkConfig) -> bulwark::error::Result<RetentionManager> {
    Ok(RetentionManager::with_max_age(
        Arc::new(FileRecordStore::new(&config.retention.data_dir)),
        config.max_age()?,
    ))
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
