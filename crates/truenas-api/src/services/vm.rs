//! Virtual machines and their devices.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};
use truenas_core::ids::{DeviceId, VmId};
use truenas_core::types::ApiFamily;
use truenas_core::Error;

use crate::client::TrueNasClient;
use crate::models::{DeviceRequest, QueryFilter, StopOptions, Vm, VmDevice, VmRequest, VmStatus};
use crate::Result;

/// VM namespace.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait VmService: Send + Sync {
    /// Create a VM without devices.
    async fn create_vm(&self, request: VmRequest) -> Result<Vm>;

    /// Look up a VM by id.
    async fn get_vm(&self, id: VmId) -> Result<Option<Vm>>;

    /// Update VM scalars.
    async fn update_vm(&self, id: VmId, request: VmRequest) -> Result<Vm>;

    /// Delete a VM. Its zvols are kept.
    async fn delete_vm(&self, id: VmId) -> Result<()>;

    /// Power on.
    async fn start_vm(&self, id: VmId) -> Result<()>;

    /// Power off; blocks until the stop job is terminal.
    async fn stop_vm(&self, id: VmId, options: StopOptions) -> Result<()>;

    /// Runtime status.
    async fn vm_status(&self, id: VmId) -> Result<VmStatus>;

    /// Attach a device.
    async fn create_device(&self, request: DeviceRequest) -> Result<VmDevice>;

    /// Change a device.
    async fn update_device(&self, id: DeviceId, request: DeviceRequest) -> Result<VmDevice>;

    /// Detach a device.
    async fn delete_device(&self, id: DeviceId) -> Result<()>;
}

#[async_trait]
impl VmService for TrueNasClient {
    async fn create_vm(&self, request: VmRequest) -> Result<Vm> {
        let method = self.method(ApiFamily::Vm, "create").await?;
        info!(vm = %request.name, "Creating VM");
        self.call(&method, vec![json!(request)]).await
    }

    async fn get_vm(&self, id: VmId) -> Result<Option<Vm>> {
        let method = self.method(ApiFamily::Vm, "query").await?;
        self.query_one(&method, QueryFilter::new().eq("id", id.get()))
            .await
    }

    async fn update_vm(&self, id: VmId, request: VmRequest) -> Result<Vm> {
        let method = self.method(ApiFamily::Vm, "update").await?;
        info!(vm_id = id.get(), "Updating VM");
        self.call(&method, vec![json!(id), json!(request)]).await
    }

    async fn delete_vm(&self, id: VmId) -> Result<()> {
        let method = self.method(ApiFamily::Vm, "delete").await?;
        info!(vm_id = id.get(), "Deleting VM");
        self.call::<Value>(&method, vec![json!(id), json!({"zvols": false, "force": false})])
            .await?;
        Ok(())
    }

    async fn start_vm(&self, id: VmId) -> Result<()> {
        let method = self.method(ApiFamily::Vm, "start").await?;
        info!(vm_id = id.get(), "Starting VM");
        self.call::<Value>(&method, vec![json!(id)]).await?;
        Ok(())
    }

    async fn stop_vm(&self, id: VmId, options: StopOptions) -> Result<()> {
        let method = self.method(ApiFamily::Vm, "stop").await?;
        info!(vm_id = id.get(), force = options.force, "Stopping VM");
        self.call_job::<Value>(&method, vec![json!(id), json!(options)])
            .await?;
        Ok(())
    }

    async fn vm_status(&self, id: VmId) -> Result<VmStatus> {
        let method = self.method(ApiFamily::Vm, "status").await?;
        self.call(&method, vec![json!(id)]).await
    }

    async fn create_device(&self, request: DeviceRequest) -> Result<VmDevice> {
        let method = self.method(ApiFamily::VmDevice, "create").await?;
        if request.vm.is_none() {
            return Err(Error::ValidationError(
                "vm.device.create requires the owning VM id".to_string(),
            ));
        }
        debug!(dtype = ?request.attributes.get("dtype"), "Creating VM device");
        self.call(&method, vec![json!(request)]).await
    }

    async fn update_device(&self, id: DeviceId, request: DeviceRequest) -> Result<VmDevice> {
        let method = self.method(ApiFamily::VmDevice, "update").await?;
        debug!(device_id = id.get(), "Updating VM device");
        self.call(&method, vec![json!(id), json!(request)]).await
    }

    async fn delete_device(&self, id: DeviceId) -> Result<()> {
        let method = self.method(ApiFamily::VmDevice, "delete").await?;
        debug!(device_id = id.get(), "Deleting VM device");
        self.call::<Value>(&method, vec![json!(id)]).await?;
        Ok(())
    }
}
