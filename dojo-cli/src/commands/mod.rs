//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod judge;
mod progress;

pub use progress::ProgressCommands;

use anyhow::Result;
use clap::{Args, Subcommand};
use dojo_core::dto::job::SubmitKind;
use dojo_progress::{ChangeBus, KeyScheme, ProgressCache, open_store};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run code against the problem's sample tests
    Run(JudgeArgs),
    /// Submit code for full judging
    Submit(JudgeArgs),
    /// Inspect and edit recorded progress
    Progress {
        #[command(subcommand)]
        command: ProgressCommands,
    },
}

/// Arguments shared by `run` and `submit`
#[derive(Args)]
pub struct JudgeArgs {
    /// Problem ID
    pub problem: String,

    /// Source file to send
    pub file: PathBuf,

    /// Course to record the attempt under
    #[arg(long)]
    pub course: Option<String>,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run(args) => judge::handle_judge_command(SubmitKind::Run, args, config).await,
        Commands::Submit(args) => {
            judge::handle_judge_command(SubmitKind::Submit, args, config).await
        }
        Commands::Progress { command } => progress::handle_progress_command(command, config).await,
    }
}

/// Opens the configured store and wraps it in a cache with a fresh bus
fn open_progress(config: &Config) -> Arc<ProgressCache> {
    let store = open_store(config.store_dir.as_deref());
    Arc::new(ProgressCache::new(
        store,
        KeyScheme::new(&config.namespace),
        ChangeBus::new(),
    ))
}
