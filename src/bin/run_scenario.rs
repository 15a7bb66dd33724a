//! rsio-run: run a scenario script once and print its report.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rsio::{Runner, Scenario};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rsio-run")]
#[command(about = "Run every scenario of a script against its target")]
#[command(version)]
struct Args {
    /// Scenario script (JSON)
    script: PathBuf,

    /// Override `config.target`, e.g. ws://127.0.0.1:9096
    #[arg(short, long, env = "RSIO_TARGET")]
    target: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "RSIO_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut scenario = Scenario::load(&args.script)?;
    if let Some(target) = &args.target {
        scenario.set_target(target)?;
    }
    info!(script = %args.script.display(), target = %scenario.config.target, "running");

    let report = Runner::new().run(&scenario).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            launched = report.scenarios_launched,
            completed = report.scenarios_completed,
            "run had failures"
        );
        Ok(ExitCode::FAILURE)
    }
}
