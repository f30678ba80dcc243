//! HTTP client tuning, connection retries and state polling.
//!
//! Two backoff shapes live here. [`RetryPolicy`] governs re-sending an RPC
//! whose connection could not be established; nothing that reached the server
//! is ever retried. [`PollPolicy`] paces the loops that watch a job or an app
//! until it settles.

use std::time::Duration;

use crate::error::{Error, ErrorCode};

// Timeouts (in seconds)

/// Default timeout for a single RPC round trip
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 30;

/// Default bound for a middleware job to reach a terminal state
pub const DEFAULT_JOB_TIMEOUT: u64 = 600;

/// Default bound for an app to reach a stable state
pub const DEFAULT_STATE_TIMEOUT: u64 = 120;

/// Smallest accepted `state_timeout`
pub const MIN_STATE_TIMEOUT: u64 = 30;

/// Largest accepted `state_timeout`
pub const MAX_STATE_TIMEOUT: u64 = 600;

// Connection pool settings

/// Default idle timeout for connection pools
pub const DEFAULT_POOL_IDLE_TIMEOUT: u64 = 90;

/// Default maximum idle connections per host
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 4;

// Retry settings

/// Default maximum number of connection retries
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default initial retry delay in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Default maximum retry delay in milliseconds
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 4000;

// Polling settings

/// First poll interval in milliseconds
pub const DEFAULT_POLL_INITIAL_MS: u64 = 1000;

/// Poll interval cap in milliseconds
pub const DEFAULT_POLL_MAX_MS: u64 = 10_000;

/// Exponential backoff shared by both policies.
const fn backoff(initial: Duration, max: Duration, multiplier: u32, step: u32) -> Duration {
    let factor = multiplier.saturating_pow(step);
    let millis = (initial.as_millis() as u64).saturating_mul(factor as u64);
    let delay = Duration::from_millis(millis);
    if delay.as_millis() > max.as_millis() {
        max
    } else {
        delay
    }
}

/// Retry policy for requests that never reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,

    /// Initial delay before first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: u32,
}

impl RetryPolicy {
    /// Create a new retry policy with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            backoff_multiplier: 2,
        }
    }

    /// Create a retry policy with no retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            backoff_multiplier: 1,
        }
    }

    /// Set the maximum number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (1-based). Attempt 0 has no delay.
    #[must_use]
    pub const fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_secs(0);
        }
        backoff(
            self.initial_delay,
            self.max_delay,
            self.backoff_multiplier,
            attempt - 1,
        )
    }

    /// Returns true if `error` is a connection failure worth another attempt.
    #[must_use]
    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        attempt < self.max_retries && error.error_code() == ErrorCode::Econnrefused
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Interval policy for polling loops (jobs, app state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Interval after the first poll
    pub initial_interval: Duration,

    /// Interval cap
    pub max_interval: Duration,

    /// Growth factor between polls
    pub multiplier: u32,
}

impl PollPolicy {
    /// 1 s, doubling, capped at 10 s.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initial_interval: Duration::from_millis(DEFAULT_POLL_INITIAL_MS),
            max_interval: Duration::from_millis(DEFAULT_POLL_MAX_MS),
            multiplier: 2,
        }
    }

    /// Constant interval.
    #[must_use]
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1,
        }
    }

    /// Set the interval cap.
    #[must_use]
    pub const fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Interval to sleep after poll number `poll` (0-based).
    #[must_use]
    pub const fn interval_after(&self, poll: u32) -> Duration {
        backoff(
            self.initial_interval,
            self.max_interval,
            self.multiplier,
            poll,
        )
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout
    pub timeout: Duration,

    /// Connection retry policy
    pub retry_policy: RetryPolicy,

    /// Job polling policy
    pub poll_policy: PollPolicy,

    /// Bound for a job to finish
    pub job_timeout: Duration,

    /// Connection pool idle timeout
    pub pool_idle_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Verify the server certificate
    pub tls_verify: bool,

    /// Enable response compression
    pub enable_compression: bool,
}

impl ClientConfig {
    /// Create a new client configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT),
            retry_policy: RetryPolicy::new(),
            poll_policy: PollPolicy::new(),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT),
            pool_idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            tls_verify: true,
            enable_compression: true,
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set job polling policy.
    #[must_use]
    pub const fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Set the job completion bound.
    #[must_use]
    pub const fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Enable or disable certificate verification.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Enable or disable compression.
    #[must_use]
    pub const fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = enabled;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
