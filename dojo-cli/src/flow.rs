//! Judge-and-record flow
//!
//! Submits code, waits for the judge, and records the outcome in the
//! progress cache. The code is saved as the item's payload before
//! submitting so a failed or cancelled run never loses the draft.

use dojo_client::{JudgeApi, PollOptions, wait_for_judge_result};
use dojo_core::domain::job::{Job, JobStatus};
use dojo_core::dto::job::SubmitKind;
use dojo_progress::ProgressCache;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One piece of code to judge
#[derive(Debug, Clone)]
pub struct Attempt<'a> {
    pub problem_id: &'a str,
    pub code: &'a str,
    pub kind: SubmitKind,
    /// Course to record progress under; nothing is recorded without one
    pub course_id: Option<&'a str>,
}

/// Terminal job plus what was recorded for it
#[derive(Debug, Clone)]
pub struct Outcome {
    pub job: Job,
    pub solved: bool,
}

/// A done job counts as solved when its result reports `"passed": true`
pub fn job_passed(job: &Job) -> bool {
    job.status == JobStatus::Done
        && job
            .result
            .as_ref()
            .and_then(|result| result.get("passed"))
            .and_then(serde_json::Value::as_bool)
            == Some(true)
}

pub async fn judge_and_record<A, F>(
    api: &A,
    cache: &ProgressCache,
    attempt: &Attempt<'_>,
    options: &PollOptions,
    on_update: F,
    cancel: &CancellationToken,
) -> dojo_client::Result<Outcome>
where
    A: JudgeApi + ?Sized,
    F: FnMut(&Job),
{
    if let Some(course_id) = attempt.course_id {
        cache.set_payload(course_id, attempt.problem_id, attempt.code);
    }

    let submitted = api
        .submit(attempt.problem_id, attempt.code, attempt.kind)
        .await?;
    info!(
        "Submitted {} as job {}",
        attempt.problem_id, submitted.job_id
    );

    let job = wait_for_judge_result(api, &submitted.job_id, options, on_update, cancel).await?;

    let solved = job_passed(&job);
    if let Some(course_id) = attempt.course_id.filter(|_| solved) {
        cache.mark_solved(course_id, attempt.problem_id);
        info!("Recorded {} as solved in {}", attempt.problem_id, course_id);
    }

    Ok(Outcome { job, solved })
}
