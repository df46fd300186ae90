//! Dojo Judge Client
//!
//! A type-safe HTTP client for the remote judge service, plus the polling
//! driver that waits for a submitted job to reach a terminal status.
//!
//! # Example
//!
//! ```no_run
//! use dojo_client::{JudgeClient, PollOptions, wait_for_judge_result};
//! use dojo_core::dto::job::SubmitKind;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = JudgeClient::new("http://localhost:8000");
//!     let cancel = CancellationToken::new();
//!
//!     let submitted = client.submit("p1", "print(42)", SubmitKind::Run).await?;
//!     let job = wait_for_judge_result(
//!         &client,
//!         &submitted.job_id,
//!         &PollOptions::default(),
//!         |job| println!("{} is {}", job.job_id, job.status),
//!         &cancel,
//!     )
//!     .await?;
//!
//!     println!("Finished: {:?}", job.result);
//!     Ok(())
//! }
//! ```

mod api;
pub mod error;
mod jobs;
pub mod poller;

// Re-export commonly used types
pub use api::JudgeApi;
pub use error::{ClientError, Result};
pub use poller::{PollInterval, PollOptions, RetryPolicy, wait_for_judge_result};

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

/// Environment variable holding the judge base URL
pub const JUDGE_URL_ENV: &str = "DOJO_JUDGE_URL";

/// HTTP client for the judge API
///
/// A missing base URL is not an error at construction time. Every request
/// fails with [`ClientError::Config`] instead, so a misconfigured
/// deployment surfaces on first use rather than silently doing nothing.
#[derive(Debug, Clone)]
pub struct JudgeClient {
    /// Base URL of the judge (e.g., "http://localhost:8000")
    base_url: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl JudgeClient {
    /// Create a new judge client
    ///
    /// # Example
    /// ```
    /// use dojo_client::JudgeClient;
    ///
    /// let client = JudgeClient::new("http://localhost:8000/");
    /// assert_eq!(client.base_url().unwrap(), "http://localhost:8000");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Some(base_url.into()), Client::new())
    }

    /// Create a client from an optional base URL, e.g. straight from config
    pub fn from_config(base_url: Option<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client from the `DOJO_JUDGE_URL` environment variable
    pub fn from_env() -> Self {
        Self::from_config(std::env::var(JUDGE_URL_ENV).ok())
    }

    /// Create a new judge client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: Option<String>, client: Client) -> Self {
        let base_url = base_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        Self { base_url, client }
    }

    /// Get the base URL of the judge
    pub fn base_url(&self) -> Result<&str> {
        self.base_url.as_deref().ok_or_else(|| {
            ClientError::Config(format!(
                "judge base URL is not configured (set {})",
                JUDGE_URL_ENV
            ))
        })
    }

    /// Appends `segments` to the base URL, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let base = self.base_url()?;
        let mut url = Url::parse(base)
            .map_err(|e| ClientError::Config(format!("invalid judge base URL {}: {}", base, e)))?;

        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("judge base URL {} cannot have a path", base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// This method checks the status code and returns an appropriate error if
    /// the request failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}
