//! Judge API seam
//!
//! The polling driver only needs these two calls, so it is written against
//! this trait rather than the concrete HTTP client.

use async_trait::async_trait;
use dojo_core::domain::job::Job;
use dojo_core::dto::job::{SubmitKind, SubmitResponse};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Submit/poll contract of the remote judge
#[async_trait]
pub trait JudgeApi: Send + Sync {
    /// Submits code for a problem and returns the server-assigned job id
    async fn submit(&self, problem_id: &str, code: &str, kind: SubmitKind)
    -> Result<SubmitResponse>;

    /// Fetches the current snapshot of a job
    ///
    /// Should fail with `ClientError::Cancelled` once `cancel` fires. The
    /// polling driver drops a fetch that keeps running after cancellation.
    async fn fetch_result(&self, job_id: &str, cancel: &CancellationToken) -> Result<Job>;
}
