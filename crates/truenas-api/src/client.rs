//! The client facade implementing every service trait.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use truenas_core::client::ClientConfig;
use truenas_core::config::ProviderConfig;
use truenas_core::types::ApiFamily;
use truenas_core::{Error, Version};

use crate::jobs::JobTracker;
use crate::models::QueryFilter;
use crate::transport::{HttpTransportBuilder, Transport};
use crate::Result;

/// Typed TrueNAS middleware client.
///
/// The server version is fetched on first use and cached for the lifetime of
/// the client; it drives method resolution for versioned families.
pub struct TrueNasClient {
    transport: Arc<dyn Transport>,
    jobs: JobTracker,
    version: OnceCell<Version>,
}

impl std::fmt::Debug for TrueNasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrueNasClient")
            .field("jobs", &self.jobs)
            .field("version", &self.version.get())
            .finish_non_exhaustive()
    }
}

impl TrueNasClient {
    /// Build a client talking JSON-RPC over HTTP to the configured server.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let transport = HttpTransportBuilder::from_config(config)?.build()?;
        info!(host = %config.host, port = config.port, "Configured TrueNAS client");
        Ok(Self::with_config(Arc::new(transport), &config.client_config()))
    }

    /// Build a client over an arbitrary transport with default settings.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, &ClientConfig::new())
    }

    /// Build a client over an arbitrary transport.
    #[must_use]
    pub fn with_config(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        let jobs = JobTracker::new(Arc::clone(&transport))
            .with_poll_policy(config.poll_policy)
            .with_timeout(config.job_timeout);
        Self {
            transport,
            jobs,
            version: OnceCell::new(),
        }
    }

    /// Job tracker used for long-running calls.
    #[must_use]
    pub const fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    /// Server version, fetched once.
    pub async fn server_version(&self) -> Result<&Version> {
        self.version
            .get_or_try_init(|| async {
                let method = format!("{}.version", ApiFamily::System.name());
                let raw: String = self.call(&method, vec![]).await?;
                let version = Version::parse(&raw)?;
                info!(version = %version, "Detected TrueNAS version");
                Ok::<_, Error>(version)
            })
            .await
    }

    /// Resolve the method name for `op` in `family`.
    ///
    /// Only versioned families cost a version lookup.
    pub async fn method(&self, family: ApiFamily, op: &str) -> Result<String> {
        if family.is_versioned() {
            let version = self.server_version().await?;
            Ok(family.method(version, op))
        } else {
            Ok(format!("{}.{op}", family.name()))
        }
    }

    /// Invoke a method and decode its result.
    pub async fn call<R: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<R> {
        let value = self.transport.call(method, params).await?;
        decode(method, value)
    }

    /// Invoke a job method, wait for the job and decode its result.
    pub async fn call_job<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<R> {
        let value = self.transport.call(method, params).await?;
        debug!(method, job = %value, "Started TrueNAS job");
        let result = self.jobs.wait_value(value).await?;
        decode(method, result)
    }

    /// Run a `query` and return the first match, `None` if nothing matches.
    pub async fn query_one<R: DeserializeOwned>(
        &self,
        method: &str,
        filter: QueryFilter,
    ) -> Result<Option<R>> {
        let rows: Vec<Value> = match self.call(method, filter.into_params()).await {
            Ok(rows) => rows,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        rows.into_iter()
            .next()
            .map(|row| decode(method, row))
            .transpose()
    }
}

fn decode<R: DeserializeOwned>(method: &str, value: Value) -> Result<R> {
    serde_json::from_value(value)
        .map_err(|err| Error::DecodeError(format!("Unexpected result from `{method}`: {err}")))
}
