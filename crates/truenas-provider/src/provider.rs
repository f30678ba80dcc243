//! Provider entry point.

use std::sync::Arc;

use tracing::info;
use truenas_api::{SystemService, TrueNasClient};
use truenas_core::client::PollPolicy;
use truenas_core::config::ProviderConfig;
use truenas_core::{Result, Version};

use crate::resources::app::AppResource;
use crate::resources::snapshot::SnapshotResource;
use crate::resources::vm::VmResource;

/// Resource type names served by the provider.
pub const RESOURCE_TYPES: &[&str] = &["truenas_app", "truenas_vm", "truenas_snapshot"];

/// Hands out resources sharing one client.
#[derive(Debug, Clone)]
pub struct TrueNasProvider {
    client: Arc<TrueNasClient>,
    poll_policy: PollPolicy,
}

impl TrueNasProvider {
    /// Provider talking to the server described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = TrueNasClient::new(&config)?;
        info!(endpoint = %config.endpoint_url()?, "TrueNAS provider configured");
        Ok(Self {
            client: Arc::new(client),
            poll_policy: config.client_config().poll_policy,
        })
    }

    /// Provider over an existing client.
    #[must_use]
    pub fn from_client(client: Arc<TrueNasClient>) -> Self {
        Self {
            client,
            poll_policy: PollPolicy::new(),
        }
    }

    /// Override the app state polling policy.
    #[must_use]
    pub const fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    /// Shared client.
    #[must_use]
    pub fn client(&self) -> Arc<TrueNasClient> {
        Arc::clone(&self.client)
    }

    /// Server version, fetched once per client.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or reports an
    /// unparsable version.
    pub async fn server_version(&self) -> Result<Version> {
        self.client.version().await
    }

    /// `truenas_app`.
    #[must_use]
    pub fn app_resource(&self) -> AppResource {
        AppResource::new(self.client()).with_poll_policy(self.poll_policy)
    }

    /// `truenas_vm`.
    #[must_use]
    pub fn vm_resource(&self) -> VmResource {
        VmResource::new(self.client())
    }

    /// `truenas_snapshot`.
    #[must_use]
    pub fn snapshot_resource(&self) -> SnapshotResource {
        SnapshotResource::new(self.client())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::Resource;

    #[test]
    fn resources_report_their_type_names() {
        let config = ProviderConfig::new("truenas.local")
            .unwrap()
            .with_api_key("1-secret");
        let provider = TrueNasProvider::new(config).unwrap();
        let names = [
            provider.app_resource().type_name(),
            provider.vm_resource().type_name(),
            provider.snapshot_resource().type_name(),
        ];
        assert_eq!(names, RESOURCE_TYPES);
    }
}
