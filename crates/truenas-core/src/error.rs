//! Error types for TrueNAS operations.
//!
//! Every failure that leaves this workspace is reducible to one of the closed
//! [`ErrorCode`] values. Server-side failures travel as [`ApiError`]s inside
//! [`Error::Api`]; everything else (configuration, decoding, cancellation) has
//! its own variant but still reports a code through [`Error::error_code`].

use crate::api_error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Closed set of error classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Invalid argument or rejected field
    #[serde(rename = "EINVAL")]
    Einval,
    /// Object does not exist
    #[serde(rename = "ENOENT")]
    Enoent,
    /// Object already exists
    #[serde(rename = "EEXIST")]
    Eexist,
    /// Operation not permitted
    #[serde(rename = "EPERM")]
    Eperm,
    /// Server-side fault
    #[serde(rename = "EFAULT")]
    Efault,
    /// Operation or job timed out
    #[serde(rename = "ETIMEDOUT")]
    Etimedout,
    /// Server could not be reached
    #[serde(rename = "ECONNREFUSED")]
    Econnrefused,
    /// Host key did not match the pinned fingerprint
    #[serde(rename = "EHOSTKEY")]
    Ehostkey,
    /// Anything that could not be classified
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl ErrorCode {
    /// Returns the wire spelling of the code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Einval => "EINVAL",
            Self::Enoent => "ENOENT",
            Self::Eexist => "EEXIST",
            Self::Eperm => "EPERM",
            Self::Efault => "EFAULT",
            Self::Etimedout => "ETIMEDOUT",
            Self::Econnrefused => "ECONNREFUSED",
            Self::Ehostkey => "EHOSTKEY",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Returns all codes.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Einval,
            Self::Enoent,
            Self::Eexist,
            Self::Eperm,
            Self::Efault,
            Self::Etimedout,
            Self::Econnrefused,
            Self::Ehostkey,
            Self::Unknown,
        ]
    }

    /// Operator hint for the code, if one exists.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Einval => Some(
                "Check the resource configuration; TrueNAS rejected the value of the field named above",
            ),
            Self::Enoent => Some(
                "Verify the resource name and that the referenced pool, dataset or path exists on the server",
            ),
            Self::Eexist => Some(
                "An object with this name already exists; import it or choose a different name",
            ),
            Self::Eperm => Some(
                "Check that the API key belongs to a user with sufficient privileges",
            ),
            Self::Efault => Some(
                "TrueNAS reported an internal failure; inspect the job logs in the TrueNAS UI",
            ),
            Self::Etimedout => Some(
                "Increase state_timeout or check the server load; the operation may still complete",
            ),
            Self::Econnrefused => Some(
                "Verify the host and port are correct and that the TrueNAS API is reachable",
            ),
            Self::Ehostkey => Some(
                "Update the known_hosts pin if the server key was rotated intentionally",
            ),
            Self::Unknown => None,
        }
    }
}

impl FromStr for ErrorCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| Error::ValidationError(format!("Unknown error code: {s}")))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for TrueNAS operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Classified failure reported by (or on the way to) the server
    #[error("{0}")]
    Api(ApiError),

    /// The host cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The server version string could not be parsed
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// A response could not be decoded
    #[error("Failed to decode response: {0}")]
    DecodeError(String),

    /// Local validation failed
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A lookup that must succeed found nothing
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Specialized result type for TrueNAS operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the classification of this error.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Api(err) => err.code,
            Self::ConfigError(_) | Self::ValidationError(_) => ErrorCode::Einval,
            Self::NotFound(_) => ErrorCode::Enoent,
            Self::Cancelled | Self::InvalidVersion(_) | Self::DecodeError(_) => {
                ErrorCode::Unknown
            }
        }
    }

    /// Returns the classified error, if this is one.
    #[must_use]
    pub const fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true if the host cancelled the operation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if the error reports a missing object.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.error_code() == ErrorCode::Enoent
    }

    /// Text shown to operators: the full rendering for classified errors,
    /// the display string otherwise.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Api(err) => err.text(),
            other => other.to_string(),
        }
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let host = err
            .url()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        let port = err
            .url()
            .and_then(url::Url::port_or_known_default)
            .unwrap_or_default();

        if err.is_timeout() {
            Self::Api(ApiError::new(
                ErrorCode::Etimedout,
                format!("request to {host}:{port} timed out: {err}"),
            ))
        } else if err.is_connect() {
            Self::Api(ApiError::connection_error(&host, port, &err.to_string()))
        } else if err.is_decode() {
            Self::DecodeError(err.to_string())
        } else {
            Self::Api(ApiError::new(ErrorCode::Unknown, err.to_string()))
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::DecodeError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::DecodeError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_spelling() {
        assert_eq!(ErrorCode::Einval.as_str(), "EINVAL");
        assert_eq!(ErrorCode::Enoent.as_str(), "ENOENT");
        assert_eq!(ErrorCode::Eexist.as_str(), "EEXIST");
        assert_eq!(ErrorCode::Eperm.as_str(), "EPERM");
        assert_eq!(ErrorCode::Efault.as_str(), "EFAULT");
        assert_eq!(ErrorCode::Etimedout.as_str(), "ETIMEDOUT");
        assert_eq!(ErrorCode::Econnrefused.as_str(), "ECONNREFUSED");
        assert_eq!(ErrorCode::Ehostkey.as_str(), "EHOSTKEY");
        assert_eq!(ErrorCode::Unknown.as_str(), "UNKNOWN");
    }

    #[test]
    fn test_error_code_from_str() {
        for code in ErrorCode::all() {
            assert_eq!(code.as_str().parse::<ErrorCode>().unwrap(), *code);
        }
        assert!("EAGAIN".parse::<ErrorCode>().is_err());
        assert!("einval".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn test_suggestions() {
        assert!(ErrorCode::Enoent.suggestion().unwrap().contains("resource name"));
        assert!(ErrorCode::Etimedout.suggestion().unwrap().contains("state_timeout"));
        assert!(ErrorCode::Ehostkey.suggestion().unwrap().contains("known_hosts"));
        assert!(ErrorCode::Unknown.suggestion().is_none());
    }

    #[test]
    fn test_error_codes_for_local_variants() {
        assert_eq!(Error::Cancelled.error_code(), ErrorCode::Unknown);
        assert_eq!(
            Error::ConfigError("x".to_string()).error_code(),
            ErrorCode::Einval
        );
        assert_eq!(
            Error::NotFound("vm 3".to_string()).error_code(),
            ErrorCode::Enoent
        );
        assert!(Error::NotFound("vm 3".to_string()).is_not_found());
        assert!(Error::Cancelled.is_cancelled());
    }

    #[test]
    fn test_api_variant_reports_inner_code() {
        let err: Error = ApiError::new(ErrorCode::Eperm, "denied").into();
        assert_eq!(err.error_code(), ErrorCode::Eperm);
        assert_eq!(err.as_api().unwrap().message, "denied");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Cancelled.to_string(), "operation cancelled");
        assert_eq!(
            Error::ConfigError("missing host".to_string()).to_string(),
            "Configuration error: missing host"
        );
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::ConfigError(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::DecodeError(_)));
    }

    #[test]
    fn test_error_clone_and_eq() {
        let err = Error::NotFound("app".to_string());
        assert_eq!(err.clone(), err);
        assert_ne!(err, Error::NotFound("other".to_string()));
    }
}
