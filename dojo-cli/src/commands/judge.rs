//! Run and submit command handlers
//!
//! Sends a source file to the judge, prints each status change while the
//! job is polled, and shows the final snapshot.

use anyhow::{Context, Result};
use colored::*;
use dojo_client::{ClientError, JudgeClient};
use dojo_core::domain::job::{Job, JobStatus};
use dojo_core::dto::job::SubmitKind;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{JudgeArgs, open_progress};
use crate::config::Config;
use crate::flow::{Attempt, judge_and_record};

/// Handle `run` and `submit`
pub async fn handle_judge_command(kind: SubmitKind, args: JudgeArgs, config: &Config) -> Result<()> {
    let code = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let client = JudgeClient::from_config(config.judge_url.clone());
    let cache = open_progress(config);
    let cancel = cancel_on_ctrl_c();

    let attempt = Attempt {
        problem_id: &args.problem,
        code: &code,
        kind,
        course_id: args.course.as_deref(),
    };

    println!(
        "{}",
        format!("Sending {} ({:?})...", args.problem, kind).bold()
    );

    let mut last_status = None;
    let outcome = judge_and_record(
        &client,
        &cache,
        &attempt,
        &config.poll_options(),
        |job| {
            if last_status != Some(job.status) {
                last_status = Some(job.status);
                println!("  {} {}", "▸".cyan(), colorize_status(&job.status));
            }
        },
        &cancel,
    )
    .await
    .map_err(explain)?;

    println!();
    print_job_details(&outcome.job);

    if outcome.solved {
        match attempt.course_id {
            Some(course_id) => println!(
                "\n{} {}",
                "✓ Passed, recorded in".green(),
                course_id.green().bold()
            ),
            None => println!("\n{}", "✓ Passed".green()),
        }
    }

    if outcome.job.status == JobStatus::Error {
        anyhow::bail!("Job {} ended with an error", outcome.job.job_id);
    }

    Ok(())
}

/// Token that is cancelled on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Ctrl-C received, cancelling");
            token.cancel();
        }
    });
    cancel
}

/// Turns client errors into messages a user can act on
fn explain(err: ClientError) -> anyhow::Error {
    match err {
        ClientError::Config(_) => anyhow::anyhow!("{err}, or pass --judge-url"),
        ClientError::Timeout { elapsed } => anyhow::anyhow!(
            "Gave up waiting for the judge after {:.1}s (raise --timeout-ms to wait longer)",
            elapsed.as_secs_f64()
        ),
        ClientError::Cancelled => anyhow::anyhow!("Cancelled"),
        other => other.into(),
    }
}

/// Print detailed job information
fn print_job_details(job: &Job) {
    println!("{}", "Job Details:".bold());
    println!("  ID:        {}", job.job_id.cyan());
    println!("  Problem:   {}", job.problem_id);
    if !job.profile.is_empty() {
        println!("  Profile:   {}", job.profile.dimmed());
    }
    println!("  Status:    {}", colorize_status(&job.status));
    println!("  Attempts:  {}", job.attempts);
    println!(
        "  Created:   {}",
        job.created_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(started) = job.started_at {
        println!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(finished) = job.finished_at {
        println!("  Finished:  {}", finished.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = job.started_at {
            let duration = finished.signed_duration_since(started);
            println!("  Duration:  {}ms", duration.num_milliseconds());
        }
    }

    if let Some(result) = &job.result {
        println!("\n{}", "Result:".bold());
        match serde_json::to_string_pretty(result) {
            Ok(pretty) => println!("{}", pretty),
            Err(_) => println!("{}", result),
        }
    }

    if let Some(error) = &job.error {
        let heading = match job.error_kind {
            Some(kind) => format!("Error ({:?}):", kind),
            None => "Error:".to_string(),
        };
        println!("\n{}", heading.bold());
        println!("{}", error.red());
    }
}

/// Colorize job status for display
fn colorize_status(status: &JobStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        JobStatus::Queued => status_str.yellow(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Done => status_str.green(),
        JobStatus::Error => status_str.red(),
    }
}
