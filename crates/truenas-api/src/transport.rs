//! JSON-RPC transport.
//!
//! [`Transport`] is the seam between the facade and the wire. The default
//! [`HttpTransport`] posts JSON-RPC 2.0 envelopes to the configured endpoint
//! with the API key as bearer token.

use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use truenas_core::client::{ClientConfig, RetryPolicy};
use truenas_core::config::ProviderConfig;
use truenas_core::{ApiError, Error, ErrorCode};
use url::Url;

const USER_AGENT: &str = concat!("truenas-api/", env!("CARGO_PKG_VERSION"));

/// Sends one middleware call and returns its raw result.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Invoke `method` with positional `params`.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value>;
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Error object of a JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    /// JSON-RPC error code
    #[serde(default)]
    pub code: i64,
    /// Top-level message
    #[serde(default)]
    pub message: String,
    /// Middleware error details
    #[serde(default)]
    pub data: Option<RpcErrorData>,
}

/// Middleware-specific part of an RPC error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RpcErrorData {
    /// errno
    #[serde(default)]
    pub error: Option<i64>,
    /// Symbolic errno (`EINVAL`, ...)
    #[serde(default)]
    pub errname: Option<String>,
    /// Human readable reason
    #[serde(default)]
    pub reason: Option<String>,
    /// Validation entries: `[field, message, errno]`
    #[serde(default)]
    pub extra: Option<Value>,
}

impl RpcError {
    /// Rebuilds the textual form the error parser understands.
    #[must_use]
    pub fn to_raw(&self) -> String {
        let Some(data) = &self.data else {
            return self.message.clone();
        };
        let errname = data
            .errname
            .clone()
            .or_else(|| data.error.and_then(errname_for).map(str::to_string));

        let first_extra = data
            .extra
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|entries| entries.first())
            .and_then(Value::as_array);
        if let Some(entry) = first_extra {
            let field = entry.first().and_then(Value::as_str).unwrap_or_default();
            let message = entry.get(1).and_then(Value::as_str).unwrap_or_default();
            let name = entry
                .get(2)
                .and_then(Value::as_i64)
                .and_then(errname_for)
                .map(str::to_string)
                .or(errname)
                .unwrap_or_else(|| "EINVAL".to_string());
            return if field.is_empty() {
                format!("[{name}] {message}")
            } else {
                format!("[{name}] {field}: {message}")
            };
        }

        match (errname, data.reason.as_deref()) {
            (_, Some(reason)) if reason.trim_start().starts_with('[') => reason.to_string(),
            (Some(name), Some(reason)) => format!("[{name}] {reason}"),
            (None, Some(reason)) => reason.to_string(),
            (_, None) => self.message.clone(),
        }
    }
}

fn errname_for(errno: i64) -> Option<&'static str> {
    match errno {
        1 => Some("EPERM"),
        2 => Some("ENOENT"),
        14 => Some("EFAULT"),
        17 => Some("EEXIST"),
        22 => Some("EINVAL"),
        110 => Some("ETIMEDOUT"),
        111 => Some("ECONNREFUSED"),
        _ => None,
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportBuilder {
    endpoint: Url,
    http_config: ClientConfig,
    api_key: Option<String>,
}

impl HttpTransportBuilder {
    /// Create a builder for the given endpoint URL.
    pub fn new(endpoint: impl AsRef<str>) -> Result<Self> {
        let endpoint = Url::parse(endpoint.as_ref()).map_err(|err| {
            Error::ConfigError(format!(
                "Invalid TrueNAS endpoint `{}`: {err}",
                endpoint.as_ref()
            ))
        })?;

        Ok(Self {
            endpoint,
            http_config: ClientConfig::new(),
            api_key: None,
        })
    }

    /// Create a builder from the provider configuration.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let mut builder = Self::new(config.endpoint_url()?)?.with_http_config(config.client_config());
        if let Some(key) = config.api_key() {
            builder = builder.with_api_key(key);
        }
        Ok(builder)
    }

    /// Override the HTTP client configuration.
    #[must_use]
    pub fn with_http_config(mut self, config: ClientConfig) -> Self {
        self.http_config = config;
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.http_config.retry_policy = retry_policy;
        self
    }

    /// Configure the API key (sent as bearer token).
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<HttpTransport> {
        let mut builder = ClientBuilder::new()
            .timeout(self.http_config.timeout)
            .user_agent(USER_AGENT)
            .pool_idle_timeout(self.http_config.pool_idle_timeout)
            .pool_max_idle_per_host(self.http_config.pool_max_idle_per_host)
            .connect_timeout(Duration::from_secs(10));

        if !self.http_config.enable_compression {
            builder = builder.no_gzip();
        }
        if !self.http_config.tls_verify {
            warn!("TLS verification disabled for TrueNAS transport");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(|err| {
            Error::ConfigError(format!("Failed to build TrueNAS HTTP client: {err}"))
        })?;

        Ok(HttpTransport {
            http,
            endpoint: self.endpoint,
            retry_policy: self.http_config.retry_policy,
            api_key: self.api_key,
            next_id: AtomicU64::new(1),
        })
    }
}

/// JSON-RPC over HTTP.
#[derive(Debug)]
pub struct HttpTransport {
    http: Client,
    endpoint: Url,
    retry_policy: RetryPolicy,
    api_key: Option<String>,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Create a transport for the given endpoint with default settings.
    pub fn new(endpoint: impl AsRef<str>) -> Result<Self> {
        HttpTransportBuilder::new(endpoint)?.build()
    }

    /// Access the endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send_once(&self, method: &str, params: &[Value]) -> Result<Value> {
        let envelope = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header("Accept", "application/json")
            .json(&envelope);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status_to_error(status, &text));
        }

        let body: RpcResponse = response.json().await.map_err(|err| {
            Error::DecodeError(format!("Failed to parse response for `{method}`: {err}"))
        })?;

        if let Some(error) = body.error {
            return Err(ApiError::parse(&error.to_raw()).into());
        }
        Ok(body.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let mut attempt = 0;
        loop {
            debug!(method, attempt, "TrueNAS RPC call");
            match self.send_once(method, &params).await {
                Ok(value) => return Ok(value),
                Err(err) if self.retry_policy.should_retry(&err, attempt) => {
                    attempt += 1;
                    let delay = self.retry_policy.delay_for_attempt(attempt);
                    debug!("Retrying TrueNAS RPC `{method}` after {:?}: {err}", delay);
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn map_status_to_error(status: StatusCode, text: &str) -> Error {
    let error = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::new(
            ErrorCode::Eperm,
            format!("TrueNAS authentication failed: {text}"),
        ),
        StatusCode::NOT_FOUND => ApiError::new(
            ErrorCode::Enoent,
            format!("TrueNAS API endpoint not found: {text}"),
        ),
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => ApiError::new(
            ErrorCode::Etimedout,
            format!("TrueNAS request timed out: {text}"),
        ),
        status if status.is_server_error() => ApiError::new(
            ErrorCode::Efault,
            format!("TrueNAS server error {status}: {text}"),
        ),
        _ => ApiError::new(ErrorCode::Unknown, format!("TrueNAS error {status}: {text}")),
    };
    error.into()
}
