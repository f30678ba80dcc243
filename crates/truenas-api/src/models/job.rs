//! Middleware job records as returned by `core.get_jobs`.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use truenas_core::ids::JobId;

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Queued, not started
    Waiting,
    /// Executing
    Running,
    /// Finished successfully
    Success,
    /// Finished with an error
    Failed,
    /// Aborted by a user or the server
    Aborted,
    /// Any state this client does not know
    #[serde(other)]
    Unknown,
}

impl JobState {
    /// Returns true once the job will not change anymore.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Aborted)
    }
}

/// Progress reported by a running job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Percent complete
    #[serde(default)]
    pub percent: Option<f64>,
    /// Current step
    #[serde(default)]
    pub description: Option<String>,
}

/// A middleware job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job id
    pub id: JobId,
    /// Method that spawned the job
    #[serde(default)]
    pub method: Option<String>,
    /// Lifecycle state
    pub state: JobState,
    /// Result on success
    #[serde(default)]
    pub result: Option<Value>,
    /// Error text on failure
    #[serde(default)]
    pub error: Option<String>,
    /// Python exception text on failure
    #[serde(default)]
    pub exception: Option<String>,
    /// Tail of the job log
    #[serde(default)]
    pub logs_excerpt: Option<String>,
    /// Progress
    #[serde(default)]
    pub progress: Option<JobProgress>,
    /// Start time
    #[serde(default, deserialize_with = "deserialize_date")]
    pub time_started: Option<DateTime<Utc>>,
    /// Finish time
    #[serde(default, deserialize_with = "deserialize_date")]
    pub time_finished: Option<DateTime<Utc>>,
}

impl Job {
    /// Raw failure text, preferring the error over the exception.
    #[must_use]
    pub fn failure_text(&self) -> String {
        let present = |text: &&str| !text.trim().is_empty();
        self.error
            .as_deref()
            .filter(present)
            .or_else(|| self.exception.as_deref().filter(present))
            .map_or_else(
                || format!("Job {} ended in state {:?}", self.id, self.state),
                str::to_string,
            )
    }
}

/// Middleware dates arrive as `{"$date": <millis>}`; plain millis and RFC 3339 are accepted too.
fn deserialize_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        Value::Object(map) => map.get("$date").and_then(Value::as_i64).and_then(from_millis),
        Value::Number(n) => n.as_i64().and_then(from_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }))
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_middleware_job() {
        let job: Job = serde_json::from_value(json!({
            "id": 812,
            "method": "app.create",
            "state": "SUCCESS",
            "result": {"name": "plex"},
            "error": null,
            "progress": {"percent": 100, "description": "Done"},
            "time_started": {"$date": 1_700_000_000_000_i64},
            "time_finished": null
        }))
        .unwrap();

        assert_eq!(job.id, JobId::new(812));
        assert_eq!(job.state, JobState::Success);
        assert!(job.state.is_terminal());
        assert_eq!(
            job.time_started.unwrap().timestamp_millis(),
            1_700_000_000_000
        );
        assert!(job.time_finished.is_none());
    }

    #[test]
    fn unknown_state_is_not_terminal() {
        let job: Job = serde_json::from_value(json!({"id": 1, "state": "PAUSED"})).unwrap();
        assert_eq!(job.state, JobState::Unknown);
        assert!(!job.state.is_terminal());
    }

    #[test]
    fn failure_text_falls_back() {
        let job: Job = serde_json::from_value(json!({
            "id": 9,
            "state": "FAILED",
            "error": "",
            "exception": "Traceback ..."
        }))
        .unwrap();
        assert_eq!(job.failure_text(), "Traceback ...");

        let job: Job = serde_json::from_value(json!({"id": 9, "state": "ABORTED"})).unwrap();
        assert!(job.failure_text().contains("Aborted"));
    }
}
