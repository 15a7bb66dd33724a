//! rsio-echo-target: Socket.IO echo server for client tests.

use std::time::Duration;

use clap::Parser;
use rsio::{EngineConfig, echo_target};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rsio-echo-target")]
#[command(about = "Socket.IO server echoing join, message and new_server_version")]
#[command(version)]
struct Args {
    /// Host address to bind to
    #[arg(long, env = "RSIO_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "RSIO_PORT", default_value_t = echo_target::DEFAULT_PORT)]
    port: u16,

    /// Engine.IO ping interval in milliseconds
    #[arg(long, env = "RSIO_PING_INTERVAL_MS", default_value_t = 25_000)]
    ping_interval_ms: u64,

    /// Engine.IO ping timeout in milliseconds
    #[arg(long, env = "RSIO_PING_TIMEOUT_MS", default_value_t = 20_000)]
    ping_timeout_ms: u64,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "RSIO_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = EngineConfig::default()
        .with_ping_interval(Duration::from_millis(args.ping_interval_ms))
        .with_ping_timeout(Duration::from_millis(args.ping_timeout_ms));

    let server = echo_target::spawn((args.host.as_str(), args.port), config).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    server.close().await;
    Ok(())
}
