//! Job-related API endpoints

use async_trait::async_trait;
use dojo_core::domain::job::Job;
use dojo_core::dto::job::{SubmitKind, SubmitRequest, SubmitResponse};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::JudgeClient;
use crate::api::JudgeApi;
use crate::error::{ClientError, Result};

impl JudgeClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Submit code to the judge
    ///
    /// # Arguments
    /// * `problem_id` - The problem the code is written for
    /// * `code` - Source code to execute
    /// * `kind` - `Run` only executes, `Submit` also grades
    ///
    /// # Returns
    /// The job id and its initial status
    pub async fn submit(
        &self,
        problem_id: &str,
        code: &str,
        kind: SubmitKind,
    ) -> Result<SubmitResponse> {
        let url = self.endpoint(&["submit"])?;
        let response = self
            .client
            .post(url)
            .json(&SubmitRequest {
                problem_id: problem_id.to_string(),
                code: code.to_string(),
                kind,
            })
            .send()
            .await?;

        let submitted: SubmitResponse = self.handle_response(response).await?;
        debug!(
            "Submitted {} as job {} ({})",
            problem_id, submitted.job_id, submitted.status
        );
        Ok(submitted)
    }

    /// Fetch the current snapshot of a job
    ///
    /// # Arguments
    /// * `job_id` - The server-assigned job id
    /// * `cancel` - Aborts the request; a response arriving afterwards is dropped
    pub async fn fetch_result(&self, job_id: &str, cancel: &CancellationToken) -> Result<Job> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let url = self.endpoint(&["result", job_id])?;
        let request = async {
            let response = self.client.get(url).send().await?;
            self.handle_response::<Job>(response).await
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = request => result,
        }
    }
}

#[async_trait]
impl JudgeApi for JudgeClient {
    async fn submit(
        &self,
        problem_id: &str,
        code: &str,
        kind: SubmitKind,
    ) -> Result<SubmitResponse> {
        JudgeClient::submit(self, problem_id, code, kind).await
    }

    async fn fetch_result(&self, job_id: &str, cancel: &CancellationToken) -> Result<Job> {
        JudgeClient::fetch_result(self, job_id, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dojo_core::domain::job::JobStatus;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_submit_posts_request_body() {
        let server = MockServer::start();

        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/submit")
                .json_body(json!({ "problem_id": "p1", "code": "print(1)", "kind": "run" }));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "job_id": "j1", "status": "queued" }));
        });

        let client = JudgeClient::new(server.base_url());
        let submitted = client.submit("p1", "print(1)", SubmitKind::Run).await.unwrap();

        mock.assert();
        assert_eq!(submitted.job_id, "j1");
        assert_eq!(submitted.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_submit_surfaces_server_error() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(POST).path("/submit");
            then.status(503).body("judge overloaded");
        });

        let client = JudgeClient::new(server.base_url());
        let err = client
            .submit("p1", "print(1)", SubmitKind::Submit)
            .await
            .unwrap_err();

        assert!(err.is_server_error());
        assert!(err.to_string().contains("judge overloaded"));
    }

    #[tokio::test]
    async fn test_fetch_result_decodes_job() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(GET).path("/result/j1");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "job_id": "j1",
                    "status": "done",
                    "problem_id": "p1",
                    "profile": "python",
                    "created_at": "2026-01-05T10:00:00Z",
                    "attempts": 1,
                    "result": { "passed": true, "stdout": "1\n" }
                }));
        });

        let client = JudgeClient::new(server.base_url());
        let job = client
            .fetch_result("j1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.result.unwrap()["passed"], json!(true));
    }

    #[tokio::test]
    async fn test_fetch_result_unknown_job() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(GET).path("/result/expired");
            then.status(404).body("no such job");
        });

        let client = JudgeClient::new(server.base_url());
        let err = client
            .fetch_result("expired", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_result_rejects_invalid_json() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(GET).path("/result/j1");
            then.status(200)
                .header("content-type", "application/json")
                .body("not valid json");
        });

        let client = JudgeClient::new(server.base_url());
        let err = client
            .fetch_result("j1", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_fetch_result_already_cancelled_sends_nothing() {
        let server = MockServer::start();

        let mock = server.mock(|when, then| {
            when.method(GET).path("/result/j1");
            then.status(200);
        });

        let cancel = CancellationToken::new();
        cancel.cancel();

        let client = JudgeClient::new(server.base_url());
        let err = client.fetch_result("j1", &cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(mock.hits(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_client_fails_on_first_call() {
        let client = JudgeClient::from_config(None);

        let err = client
            .submit("p1", "print(1)", SubmitKind::Run)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));

        let err = client
            .fetch_result("j1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
