//! Middleware job tracking.
//!
//! Calls such as `app.create` return a job id immediately and finish in the
//! background. [`JobTracker::wait`] polls `core.get_jobs` until the job is
//! terminal so callers see a blocking operation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use truenas_core::client::{PollPolicy, DEFAULT_JOB_TIMEOUT};
use truenas_core::ids::JobId;
use truenas_core::types::ApiFamily;
use truenas_core::{ApiError, Error};

use crate::models::job::{Job, JobState};
use crate::models::QueryFilter;
use crate::transport::Transport;
use crate::Result;

/// Polls jobs until they finish.
#[derive(Clone)]
pub struct JobTracker {
    transport: Arc<dyn Transport>,
    poll_policy: PollPolicy,
    timeout: Duration,
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("poll_policy", &self.poll_policy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl JobTracker {
    /// Create a tracker with the default poll policy and timeout.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            poll_policy: PollPolicy::new(),
            timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT),
        }
    }

    /// Override the poll policy.
    #[must_use]
    pub const fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Override the completion bound.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Completion bound.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch a single job record.
    pub async fn get(&self, job_id: JobId) -> Result<Option<Job>> {
        let method = format!("{}.get_jobs", ApiFamily::Core.name());
        let params = QueryFilter::new().eq("id", job_id.get()).into_params();
        let value = self.transport.call(&method, params).await?;
        let mut jobs: Vec<Job> = serde_json::from_value(value)?;
        Ok(if jobs.is_empty() {
            None
        } else {
            Some(jobs.swap_remove(0))
        })
    }

    /// Wait for `job_id` to finish and return its result.
    ///
    /// # Errors
    ///
    /// Returns the job's parsed failure (with job id and log excerpt) when it
    /// fails or is aborted, and `ETIMEDOUT` once the bound elapses.
    pub async fn wait(&self, job_id: JobId) -> Result<Value> {
        let deadline = Instant::now() + self.timeout;
        let mut poll = 0;

        loop {
            let job = self.get(job_id).await?.ok_or_else(|| {
                Error::NotFound(format!("Job {job_id} is not known to the server"))
            })?;
            debug!(job_id = job_id.get(), state = ?job.state, "Polled TrueNAS job");

            match job.state {
                JobState::Success => return Ok(job.result.unwrap_or(Value::Null)),
                JobState::Failed | JobState::Aborted => {
                    warn!(job_id = job_id.get(), state = ?job.state, "TrueNAS job did not succeed");
                    let mut error = ApiError::parse(&job.failure_text()).with_job_id(job_id.get());
                    if let Some(logs) = job.logs_excerpt.as_deref() {
                        error = error.with_logs(logs);
                    }
                    return Err(error.into());
                }
                _ => {}
            }

            let interval = self.poll_policy.interval_after(poll);
            poll += 1;
            if Instant::now() + interval > deadline {
                return Err(ApiError::timeout_error(
                    job_id.get(),
                    &format!("{}s", self.timeout.as_secs()),
                )
                .into());
            }
            sleep(interval).await;
        }
    }

    /// Interpret `value` as a job id and wait for it.
    ///
    /// Some methods finish synchronously on older releases and return their
    /// result directly; anything that is not an integer is passed through.
    pub async fn wait_value(&self, value: Value) -> Result<Value> {
        match value.as_i64() {
            Some(id) => self.wait(JobId::new(id)).await,
            None => Ok(value),
        }
    }
}
