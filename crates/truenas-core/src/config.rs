//! Provider connection configuration.
//!
//! Values come from the provider block or, when absent, from `TRUENAS_*`
//! environment variables. The API key is held in a [`SecretString`] and never
//! serialised.

use crate::client::{ClientConfig, RetryPolicy};
use crate::Error;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use validator::{Validate, ValidationError};

/// Environment variable for the server host
pub const ENV_HOST: &str = "TRUENAS_HOST";
/// Environment variable for the server port
pub const ENV_PORT: &str = "TRUENAS_PORT";
/// Environment variable for the API key
pub const ENV_API_KEY: &str = "TRUENAS_API_KEY";
/// Environment variable toggling certificate verification
pub const ENV_TLS_VERIFY: &str = "TRUENAS_TLS_VERIFY";

/// Connection settings for a TrueNAS server.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ProviderConfig {
    /// Server host name or address
    #[validate(length(min = 1))]
    pub host: String,

    /// API port
    #[validate(range(min = 1, max = 65535))]
    #[serde(default = "default_port")]
    pub port: u32,

    /// `http` or `https`
    #[validate(custom(function = "validate_scheme"))]
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Path of the JSON-RPC endpoint
    #[validate(custom(function = "validate_api_path"))]
    #[serde(default = "default_api_path")]
    pub api_path: String,

    /// API key used as bearer token
    #[serde(skip)]
    pub api_key: Option<SecretString>,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Job completion bound in seconds
    #[validate(range(min = 10, max = 7200))]
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Maximum number of connection retries
    #[validate(range(min = 0, max = 10))]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

const fn default_port() -> u32 {
    443
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_api_path() -> String {
    "/api/current".to_string()
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_request_timeout_secs() -> u64 {
    crate::client::DEFAULT_REQUEST_TIMEOUT
}

const fn default_job_timeout_secs() -> u64 {
    crate::client::DEFAULT_JOB_TIMEOUT
}

const fn default_max_retries() -> u32 {
    crate::client::DEFAULT_MAX_RETRIES
}

fn validate_scheme(scheme: &str) -> Result<(), ValidationError> {
    match scheme {
        "http" | "https" => Ok(()),
        _ => Err(ValidationError::new("scheme")),
    }
}

fn validate_api_path(path: &str) -> Result<(), ValidationError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(ValidationError::new("api_path"))
    }
}

impl ProviderConfig {
    /// Create a configuration for `host` with defaults everywhere else.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn new(host: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            host: host.into(),
            port: default_port(),
            scheme: default_scheme(),
            api_path: default_api_path(),
            api_key: None,
            tls_verify: default_tls_verify(),
            request_timeout_secs: default_request_timeout_secs(),
            job_timeout_secs: default_job_timeout_secs(),
            max_retries: default_max_retries(),
        };

        config
            .validate()
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;

        Ok(config)
    }

    /// Build a configuration from `TRUENAS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `TRUENAS_HOST` is missing or a value does not parse.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is missing or a value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup(ENV_HOST)
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| Error::ConfigError(format!("{ENV_HOST} is not set")))?;

        let mut config = Self::new(host)?;

        if let Some(port) = lookup(ENV_PORT) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| Error::ConfigError(format!("{ENV_PORT} is not a port: {port}")))?;
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            config = config.with_api_key(key);
        }
        if let Some(verify) = lookup(ENV_TLS_VERIFY) {
            config.tls_verify = match verify.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(Error::ConfigError(format!(
                        "{ENV_TLS_VERIFY} must be a boolean, got {other}"
                    )))
                }
            };
            if !config.tls_verify {
                warn!(host = %config.host, "TLS certificate verification disabled");
            }
        }

        config.validate()?;
        debug!(
            host = %config.host,
            port = config.port,
            has_api_key = config.api_key.is_some(),
            "Loaded provider configuration from environment"
        );
        Ok(config)
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    /// Set the port.
    #[must_use]
    pub const fn with_port(mut self, port: u32) -> Self {
        self.port = port;
        self
    }

    /// Set the scheme.
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Set the job completion bound in seconds.
    #[must_use]
    pub const fn with_job_timeout(mut self, seconds: u64) -> Self {
        self.job_timeout_secs = seconds;
        self
    }

    /// Set maximum connection retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Exposes the API key for the transport.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|key| key.expose_secret())
    }

    /// Build and validate the RPC endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the URL does not parse.
    pub fn endpoint_url(&self) -> Result<Url, Error> {
        self.validate()?;
        let raw = format!(
            "{}://{}:{}{}",
            self.scheme, self.host, self.port, self.api_path
        );
        Url::parse(&raw).map_err(|e| Error::ConfigError(format!("Invalid endpoint URL `{raw}`: {e}")))
    }

    /// HTTP client settings derived from this configuration.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new()
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_job_timeout(Duration::from_secs(self.job_timeout_secs))
            .with_retry_policy(RetryPolicy::new().with_max_retries(self.max_retries))
            .with_tls_verify(self.tls_verify)
    }
}
