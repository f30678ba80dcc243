//! System information.

use async_trait::async_trait;
use truenas_core::Version;

use crate::client::TrueNasClient;
use crate::Result;

/// System namespace.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait SystemService: Send + Sync {
    /// Parsed server version.
    async fn version(&self) -> Result<Version>;
}

#[async_trait]
impl SystemService for TrueNasClient {
    async fn version(&self) -> Result<Version> {
        self.server_version().await.cloned()
    }
}
