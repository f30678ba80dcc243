//! Polling until an app settles.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use truenas_core::client::PollPolicy;
use truenas_core::{ApiError, Error, ErrorCode, Result};

use super::state::AppState;
use crate::framework::OperationContext;

/// How a wait ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The app reached a stable state
    Stable(AppState),
    /// The host cancelled; the last observed state, if any
    Cancelled(Option<AppState>),
}

/// Poll `query` until it reports a stable state.
///
/// `query` returns the current state label, or `None` if the app vanished.
/// The wait never sleeps past `timeout`, so it gives up within one poll
/// round trip of the bound.
///
/// # Errors
///
/// `ETIMEDOUT` naming the app, its last state and the timeout; `ENOENT` if the
/// app disappears; any error from `query`.
pub async fn wait_for_stable<F, Fut>(
    ctx: &OperationContext,
    name: &str,
    timeout: Duration,
    policy: PollPolicy,
    mut query: F,
) -> Result<WaitOutcome>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<Option<String>>> + Send,
{
    let deadline = Instant::now() + timeout;
    let mut last: Option<AppState> = None;
    let mut poll = 0;

    loop {
        if ctx.is_cancelled() {
            warn!(app = name, "Wait for stable app state cancelled");
            return Ok(WaitOutcome::Cancelled(last));
        }

        let label = query().await?.ok_or_else(|| {
            Error::from(ApiError::new(
                ErrorCode::Enoent,
                format!("app '{name}' disappeared while waiting for a stable state"),
            ))
        })?;
        let state = AppState::parse(&label);
        debug!(app = name, state = %state, poll, "Polled app state");
        if state.is_stable() {
            return Ok(WaitOutcome::Stable(state));
        }
        last = Some(state);

        let now = Instant::now();
        if now >= deadline {
            let last_state = last.as_ref().map_or("unknown", AppState::as_str);
            return Err(ApiError::new(
                ErrorCode::Etimedout,
                format!(
                    "app '{name}' did not reach a stable state within {}s (last state: {last_state})",
                    timeout.as_secs()
                ),
            )
            .into());
        }

        let interval = policy.interval_after(poll).min(deadline - now);
        poll += 1;
        tokio::select! {
            () = sleep(interval) => {}
            () = ctx.cancelled() => {
                warn!(app = name, "Wait for stable app state cancelled");
                return Ok(WaitOutcome::Cancelled(last));
            }
        }
    }
}
