//! Job DTOs for the judge HTTP contract

use serde::{Deserialize, Serialize};

use crate::domain::job::JobStatus;

/// Whether the code is only run or also graded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitKind {
    Run,
    Submit,
}

/// Body of `POST /submit`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub problem_id: String,
    pub code: String,
    pub kind: SubmitKind,
}

/// Response of `POST /submit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}
