//! Virtual machine payloads (`vm.*`, `vm.device.*`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use truenas_core::ids::{DeviceId, VmId};

/// Runtime status of a VM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmStatus {
    /// `RUNNING`, `STOPPED`, `SUSPENDED`, ...
    pub state: String,
    /// Hypervisor process id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i64>,
    /// libvirt domain state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_state: Option<String>,
}

impl VmStatus {
    /// True when the hypervisor reports the guest as running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("RUNNING")
    }
}

/// VM record as returned by `vm.query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vm {
    /// VM id
    pub id: VmId,
    /// VM name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Virtual sockets
    pub vcpus: i64,
    /// Cores per socket
    pub cores: i64,
    /// Threads per core
    pub threads: i64,
    /// Memory in MiB
    pub memory: i64,
    /// Minimum memory in MiB (ballooning)
    #[serde(default)]
    pub min_memory: Option<i64>,
    /// Start on boot
    #[serde(default)]
    pub autostart: bool,
    /// Guest clock (`LOCAL` / `UTC`)
    #[serde(default)]
    pub time: String,
    /// `UEFI` / `UEFI_CSM`
    #[serde(default)]
    pub bootloader: String,
    /// CPU mode
    #[serde(default)]
    pub cpu_mode: String,
    /// CPU model for `CUSTOM` mode
    #[serde(default)]
    pub cpu_model: Option<String>,
    /// Seconds to wait for a clean shutdown
    #[serde(default)]
    pub shutdown_timeout: i64,
    /// Runtime status
    #[serde(default)]
    pub status: VmStatus,
    /// Attached devices
    #[serde(default)]
    pub devices: Vec<VmDevice>,
}

/// Scalar payload for `vm.create` and `vm.update`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmRequest {
    /// VM name
    pub name: String,
    /// Description
    pub description: String,
    /// Virtual sockets
    pub vcpus: i64,
    /// Cores per socket
    pub cores: i64,
    /// Threads per core
    pub threads: i64,
    /// Memory in MiB
    pub memory: i64,
    /// Minimum memory in MiB, `null` clears it
    pub min_memory: Option<i64>,
    /// Start on boot
    pub autostart: bool,
    /// Guest clock
    pub time: String,
    /// Bootloader
    pub bootloader: String,
    /// CPU mode
    pub cpu_mode: String,
    /// CPU model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_model: Option<String>,
    /// Clean shutdown bound
    pub shutdown_timeout: i64,
}

/// Device record as returned by `vm.device.query` or embedded in a VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmDevice {
    /// Device id
    pub id: DeviceId,
    /// Owning VM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm: Option<VmId>,
    /// Boot / attach order
    #[serde(default)]
    pub order: Option<i64>,
    /// Device class on releases that keep it outside the attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
    /// Type-specific payload
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl VmDevice {
    /// Device class (`DISK`, `RAW`, `CDROM`, `NIC`, `DISPLAY`, `PCI`, `USB`).
    #[must_use]
    pub fn dtype(&self) -> Option<&str> {
        self.attributes
            .get("dtype")
            .and_then(Value::as_str)
            .or(self.dtype.as_deref())
    }

    /// String attribute.
    #[must_use]
    pub fn str_attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Integer attribute.
    #[must_use]
    pub fn int_attr(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(Value::as_i64)
    }

    /// Boolean attribute.
    #[must_use]
    pub fn bool_attr(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(Value::as_bool)
    }
}

/// Payload for `vm.device.create` and `vm.device.update`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRequest {
    /// Owning VM, only sent on create
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm: Option<VmId>,
    /// Order, sent only when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    /// Type-specific payload including `dtype`
    pub attributes: Map<String, Value>,
}

/// Options for `vm.stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopOptions {
    /// Power off immediately
    pub force: bool,
    /// Power off once `shutdown_timeout` elapses
    pub force_after_timeout: bool,
}

impl StopOptions {
    /// ACPI shutdown, forced once the guest's shutdown timeout elapses.
    #[must_use]
    pub const fn graceful() -> Self {
        Self {
            force: false,
            force_after_timeout: true,
        }
    }

    /// Immediate power off.
    #[must_use]
    pub const fn forced() -> Self {
        Self {
            force: true,
            force_after_timeout: true,
        }
    }
}
