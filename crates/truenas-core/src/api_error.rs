//! Classified server errors.
//!
//! TrueNAS reports failures as free text, usually shaped like
//! `[EINVAL] app_create.name: Field required`, sometimes wrapped by the
//! command runner (`Process exited with status 1: ...`) and often followed by
//! a Python traceback. [`ApiError::parse`] reduces all of that to a
//! classification, an optional field path and a message, and
//! [`ApiError::text`] renders it back for operators.

use crate::error::ErrorCode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

const TRACEBACK_MARKER: &str = "Traceback (most recent call last):";
const JOB_LOGS_HEADER: &str = "\n\nJob logs:\n";
const SUGGESTION_HEADER: &str = "\n\nSuggestion: ";

static EXIT_STATUS_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Process exited with status \d+: ").expect("valid regex"));

static CODED_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\[([A-Z]+)\]\s*(?:(\S+):\s*)?(.*)$").expect("valid regex")
});

/// A classified error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    /// Classification
    pub code: ErrorCode,
    /// Message safe for end-user display
    pub message: String,
    /// Dotted path into the offending payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Operator hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Server job that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i64>,
    /// Tail of the job log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs_excerpt: Option<String>,
}

impl ApiError {
    /// Creates an error with the default suggestion for `code`.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            suggestion: code.suggestion().map(str::to_string),
            job_id: None,
            logs_excerpt: None,
        }
    }

    /// Parses a raw server error string.
    ///
    /// Parsing is total: anything without a recognised `[CODE]` header is
    /// classified as [`ErrorCode::Unknown`] with the cleaned text as message.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut text = raw.to_string();
        while let Some(end) = EXIT_STATUS_PREFIX.find(&text).map(|m| m.end()) {
            text.drain(..end);
        }

        if let Some(idx) = text.find(TRACEBACK_MARKER) {
            text.truncate(idx);
        }

        if let Some(idx) = text.rfind(SUGGESTION_HEADER) {
            text.truncate(idx);
        }

        let mut logs_excerpt = None;
        if let Some(idx) = text.find(JOB_LOGS_HEADER) {
            let logs = text[idx + JOB_LOGS_HEADER.len()..].trim().to_string();
            if !logs.is_empty() {
                logs_excerpt = Some(logs);
            }
            text.truncate(idx);
        }

        let cleaned = text.trim();
        let mut error = match CODED_MESSAGE.captures(cleaned) {
            Some(caps) => match caps[1].parse::<ErrorCode>() {
                Ok(code) if code != ErrorCode::Unknown => {
                    let mut error = Self::new(code, caps[3].trim().to_string());
                    error.field = caps.get(2).map(|m| m.as_str().to_string());
                    error
                }
                _ => Self::new(ErrorCode::Unknown, cleaned),
            },
            None => Self::new(ErrorCode::Unknown, cleaned),
        };
        error.logs_excerpt = logs_excerpt;
        error
    }

    /// Failure to reach the server.
    #[must_use]
    pub fn connection_error(host: &str, port: u16, underlying: &str) -> Self {
        Self::new(
            ErrorCode::Econnrefused,
            format!("unable to connect to {host}:{port}: {underlying}"),
        )
    }

    /// A job that did not finish in time. `duration` is kept verbatim.
    #[must_use]
    pub fn timeout_error(job_id: i64, duration: &str) -> Self {
        let mut error = Self::new(
            ErrorCode::Etimedout,
            format!("job {job_id} did not complete within {duration}"),
        );
        error.job_id = Some(job_id);
        error
    }

    /// The server presented a different host key than the pinned one.
    #[must_use]
    pub fn host_key_error(host: &str, expected_fp: &str, actual_fp: &str) -> Self {
        Self::new(
            ErrorCode::Ehostkey,
            format!(
                "host key for {host} does not match: expected {expected_fp}, got {actual_fp}"
            ),
        )
    }

    /// Attach the failing job id.
    #[must_use]
    pub const fn with_job_id(mut self, job_id: i64) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Attach a job log excerpt. Blank excerpts are dropped.
    #[must_use]
    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        let logs = logs.into();
        let trimmed = logs.trim();
        self.logs_excerpt = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    /// Attach the offending field path.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Replace the suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Renders the error for operators.
    ///
    /// The first line is `[CODE] field: message` (just the message for
    /// unclassified errors), followed by the job log and suggestion sections
    /// when present. Feeding the output back to [`ApiError::parse`] yields the
    /// same classification.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        if self.code != ErrorCode::Unknown {
            out.push('[');
            out.push_str(self.code.as_str());
            out.push_str("] ");
            if let Some(field) = &self.field {
                out.push_str(field);
                out.push_str(": ");
            }
        }
        out.push_str(&self.message);

        if let Some(logs) = self.logs_excerpt.as_deref().filter(|l| !l.is_empty()) {
            out.push_str(JOB_LOGS_HEADER);
            out.push_str(logs);
        }
        if let Some(suggestion) = self.suggestion.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(SUGGESTION_HEADER);
            out.push_str(suggestion);
        }
        out
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

impl std::error::Error for ApiError {}
