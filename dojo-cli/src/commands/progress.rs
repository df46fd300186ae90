//! Progress command handlers
//!
//! Reads and edits the progress records of a course.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use dojo_progress::{AggregateObserver, AggregateState, ProgressCache};
use std::sync::Arc;

use super::open_progress;
use crate::config::Config;

/// Progress subcommands
#[derive(Subcommand)]
pub enum ProgressCommands {
    /// Show how many of the given items are solved
    Show {
        /// Course ID
        #[arg(long)]
        course: String,

        /// Item IDs to count
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Mark items as solved
    Mark {
        /// Course ID
        #[arg(long)]
        course: String,

        /// Item IDs to mark
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Forget the status and saved code of an item
    Reset {
        /// Course ID
        #[arg(long)]
        course: String,

        /// Item ID
        item: String,
    },
    /// Print the code saved for an item
    Code {
        /// Course ID
        #[arg(long)]
        course: String,

        /// Item ID
        item: String,
    },
}

/// Handle progress commands
pub async fn handle_progress_command(command: ProgressCommands, config: &Config) -> Result<()> {
    let cache = open_progress(config);

    match command {
        ProgressCommands::Show { course, items } => show(cache, &course, items).await,
        ProgressCommands::Mark { course, items } => {
            cache.mark_many_solved(&course, &items);
            println!(
                "{}",
                format!("✓ Marked {} item(s) solved in {}", items.len(), course).green()
            );
            Ok(())
        }
        ProgressCommands::Reset { course, item } => {
            cache.reset_item(&course, &item);
            println!("{}", format!("✓ Reset {} in {}", item, course).green());
            Ok(())
        }
        ProgressCommands::Code { course, item } => {
            match cache.get_payload(&course, &item) {
                Some(code) => print!("{}", code),
                None => println!("{}", format!("No saved code for {}.", item).yellow()),
            }
            Ok(())
        }
    }
}

async fn show(cache: Arc<ProgressCache>, course: &str, items: Vec<String>) -> Result<()> {
    let observer = AggregateObserver::spawn(course, items.clone(), Arc::clone(&cache), cache.bus());
    let state = observer.wait_until_loaded().await;
    observer.shutdown();

    println!("{}", format!("Progress for {}:", course).bold());
    println!("  {}", summary_line(&state));
    println!();
    for item in &items {
        if cache.is_solved(course, item) {
            println!("  {} {}", "✓".green(), item);
        } else {
            println!("  {} {}", "·".dimmed(), item.dimmed());
        }
    }

    Ok(())
}

fn summary_line(state: &AggregateState) -> String {
    format!(
        "{}/{} solved ({}%)",
        state.solved_count, state.total, state.percentage
    )
}
