//! Dojo CLI
//!
//! Runs code against the judge and keeps course progress on disk.

mod commands;
mod config;
mod flow;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dojo")]
#[command(about = "Judge client and progress tracker", long_about = None)]
struct Cli {
    /// Judge base URL
    #[arg(long, global = true, env = "DOJO_JUDGE_URL")]
    judge_url: Option<String>,

    /// Directory holding the progress store
    #[arg(long, global = true, env = "DOJO_STORE_DIR", default_value = ".dojo")]
    store_dir: PathBuf,

    /// Do not persist progress
    #[arg(long, global = true)]
    no_store: bool,

    /// Key prefix for progress records
    #[arg(long, global = true, env = "DOJO_NAMESPACE", default_value = "dojo")]
    namespace: String,

    /// How long to wait for a job to finish, in milliseconds
    #[arg(long, global = true, env = "DOJO_POLL_TIMEOUT_MS", default_value_t = 15_000)]
    timeout_ms: u64,

    /// Delay between status fetches, in milliseconds
    #[arg(long, global = true, env = "DOJO_POLL_INTERVAL_MS", default_value_t = 1_000)]
    interval_ms: u64,

    /// Double the delay after every fetch (capped at 8x the interval)
    #[arg(long, global = true)]
    backoff: bool,

    /// Consecutive transient fetch failures to tolerate
    #[arg(long, global = true, env = "DOJO_POLL_RETRIES", default_value_t = 0)]
    retries: u32,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dojo_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        judge_url: cli.judge_url,
        store_dir: (!cli.no_store).then_some(cli.store_dir),
        namespace: cli.namespace,
        poll_timeout: Duration::from_millis(cli.timeout_ms),
        poll_interval: Duration::from_millis(cli.interval_ms),
        backoff: cli.backoff,
        retries: cli.retries,
    };
    config.validate()?;

    handle_command(cli.command, &config).await
}
