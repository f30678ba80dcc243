//! ZFS snapshots. The namespace moved to `pool.snapshot` in 25.10.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;
use truenas_core::types::ApiFamily;

use crate::client::TrueNasClient;
use crate::models::{QueryFilter, Snapshot, SnapshotCreateRequest};
use crate::Result;

/// Snapshot namespace.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait SnapshotService: Send + Sync {
    /// Take a snapshot.
    async fn create_snapshot(&self, request: SnapshotCreateRequest) -> Result<Snapshot>;

    /// Look up a snapshot by `dataset@name`.
    async fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot>>;

    /// Destroy a snapshot.
    async fn delete_snapshot(&self, id: &str, recursive: bool) -> Result<()>;
}

#[async_trait]
impl SnapshotService for TrueNasClient {
    async fn create_snapshot(&self, request: SnapshotCreateRequest) -> Result<Snapshot> {
        let method = self.method(ApiFamily::Snapshot, "create").await?;
        info!(dataset = %request.dataset, name = %request.name, method = %method, "Creating snapshot");
        self.call(&method, vec![json!(request)]).await
    }

    async fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot>> {
        let method = self.method(ApiFamily::Snapshot, "query").await?;
        self.query_one(&method, QueryFilter::new().eq("id", id)).await
    }

    async fn delete_snapshot(&self, id: &str, recursive: bool) -> Result<()> {
        let method = self.method(ApiFamily::Snapshot, "delete").await?;
        info!(snapshot = %id, "Deleting snapshot");
        self.call::<Value>(&method, vec![json!(id), json!({"recursive": recursive})])
            .await?;
        Ok(())
    }
}
