//! Configuration module
//!
//! Settings shared by all commands: where the judge lives, where progress
//! is stored, and how submissions are polled.

use dojo_client::{PollInterval, PollOptions, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Backoff never grows beyond this multiple of the base interval
const MAX_BACKOFF_FACTOR: u32 = 8;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Judge base URL; commands that need it fail when it is missing
    pub judge_url: Option<String>,

    /// Directory of the progress store; `None` disables persistence
    pub store_dir: Option<PathBuf>,

    /// Key prefix for progress records
    pub namespace: String,

    /// Wall-clock budget for waiting on one job
    pub poll_timeout: Duration,

    /// Delay between two status fetches
    pub poll_interval: Duration,

    /// Double the delay after every fetch instead of keeping it fixed
    pub backoff: bool,

    /// Consecutive transient fetch failures tolerated while polling
    pub retries: u32,
}

impl Config {
    /// Polling parameters derived from this configuration
    pub fn poll_options(&self) -> PollOptions {
        let interval = if self.backoff {
            PollInterval::exponential(
                self.poll_interval,
                self.poll_interval.saturating_mul(MAX_BACKOFF_FACTOR),
            )
        } else {
            PollInterval::Fixed(self.poll_interval)
        };

        PollOptions::default()
            .with_timeout(self.poll_timeout)
            .with_interval(interval)
            .with_retry(RetryPolicy::retries(self.retries))
    }

    /// Validates the configuration
    ///
    /// A missing judge URL is allowed here; progress commands work without
    /// it and judge commands report it on first use.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(url) = &self.judge_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("judge_url must start with http:// or https://");
            }
        }

        if self.namespace.is_empty() {
            anyhow::bail!("namespace cannot be empty");
        }

        if self.namespace.contains(':') {
            anyhow::bail!("namespace cannot contain ':'");
        }

        if self.poll_timeout.is_zero() {
            anyhow::bail!("poll timeout must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            judge_url: None,
            store_dir: Some(PathBuf::from(".dojo")),
            namespace: "dojo".to_string(),
            poll_timeout: Duration::from_millis(15_000),
            poll_interval: Duration::from_millis(1_000),
            backoff: false,
            retries: 0,
        }
    }
}
