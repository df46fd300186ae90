//! Job result poller
//!
//! Drives repeated status fetches for one job until it reaches a terminal
//! status, the wall-clock budget runs out, or the caller cancels. Fetches for
//! a job are strictly sequential: fetch, wait, fetch.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dojo_core::domain::job::Job;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::JudgeApi;
use crate::error::{ClientError, Result};

/// Computes the delay before the next fetch from `(attempt, elapsed)`
pub type BackoffFn = Arc<dyn Fn(u32, Duration) -> Duration + Send + Sync>;

/// How long to wait between two fetches
#[derive(Clone)]
pub enum PollInterval {
    /// Same delay after every fetch
    Fixed(Duration),
    /// Delay computed per attempt (attempt counts from 0)
    Backoff(BackoffFn),
}

impl PollInterval {
    /// Wraps a closure as a variable interval
    pub fn backoff<F>(f: F) -> Self
    where
        F: Fn(u32, Duration) -> Duration + Send + Sync + 'static,
    {
        Self::Backoff(Arc::new(f))
    }

    /// Doubles the delay after every attempt, starting at `initial`, capped at `max`
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self::backoff(move |attempt, _elapsed| {
            let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
            initial.saturating_mul(factor).min(max)
        })
    }

    /// Delay to sleep after fetch number `attempt`
    pub fn delay(&self, attempt: u32, elapsed: Duration) -> Duration {
        match self {
            Self::Fixed(interval) => *interval,
            Self::Backoff(f) => f(attempt, elapsed),
        }
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self::Fixed(Duration::from_millis(1000))
    }
}

impl fmt::Debug for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(interval) => f.debug_tuple("Fixed").field(interval).finish(),
            Self::Backoff(_) => f.write_str("Backoff(..)"),
        }
    }
}

/// What to do when a single fetch fails in transport
///
/// With the default (`max_retries = 0`) the first failed fetch aborts the
/// poll. Otherwise up to `max_retries` consecutive transient failures are
/// tolerated; a successful fetch resets the count. Non-transient failures
/// (4xx, parse errors, configuration) always abort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn retries(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

/// Polling parameters
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Hard wall-clock budget for the whole wait
    pub timeout: Duration,
    pub interval: PollInterval,
    pub retry: RetryPolicy,
}

impl PollOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: PollInterval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(15_000),
            interval: PollInterval::default(),
            retry: RetryPolicy::none(),
        }
    }
}

/// Polls `job_id` until it is `done` or `error`
///
/// `on_update` runs after every successful fetch, terminal or not. Fails with
/// [`ClientError::Timeout`] once `options.timeout` elapses and with
/// [`ClientError::Cancelled`] as soon as `cancel` fires, whether the loop is
/// fetching or sleeping at the time.
pub async fn wait_for_judge_result<A, F>(
    api: &A,
    job_id: &str,
    options: &PollOptions,
    mut on_update: F,
    cancel: &CancellationToken,
) -> Result<Job>
where
    A: JudgeApi + ?Sized,
    F: FnMut(&Job),
{
    let start = Instant::now();
    let mut attempt: u32 = 0;
    let mut consecutive_failures: u32 = 0;

    while start.elapsed() < options.timeout {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let remaining = options.timeout.saturating_sub(start.elapsed());
        let fetch = time::timeout(remaining, api.fetch_result(job_id, cancel));
        let fetched = tokio::select! {
            biased;
            // A late response is dropped with the fetch
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            fetched = fetch => match fetched {
                Ok(fetched) => fetched,
                // The fetch itself outlived the budget
                Err(_) => break,
            },
        };

        match fetched {
            Ok(job) => {
                consecutive_failures = 0;
                on_update(&job);

                if job.is_terminal() {
                    info!(
                        "Job {} finished with status {} after {} fetch(es)",
                        job_id,
                        job.status,
                        attempt + 1
                    );
                    return Ok(job);
                }

                debug!("Job {} is {} (attempt {})", job_id, job.status, attempt);
            }
            Err(e) if e.is_transient() && consecutive_failures < options.retry.max_retries => {
                consecutive_failures += 1;
                warn!(
                    "Fetching job {} failed (retry {}/{}): {}",
                    job_id, consecutive_failures, options.retry.max_retries, e
                );
            }
            Err(e) => return Err(e),
        }

        let elapsed = start.elapsed();
        let delay = options
            .interval
            .delay(attempt, elapsed)
            .min(options.timeout.saturating_sub(elapsed));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            _ = time::sleep(delay) => {}
        }

        attempt += 1;
    }

    warn!("Gave up waiting for job {} after {:?}", job_id, start.elapsed());
    Err(ClientError::Timeout {
        elapsed: start.elapsed(),
    })
}
