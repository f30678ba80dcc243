//! VM resource model.

use truenas_api::models::VmRequest;
use truenas_core::ids::VmId;

use super::devices::{
    CdromDevice, DiskDevice, DisplayDevice, NicDevice, PciDevice, RawDevice, UsbDevice,
};
use crate::framework::Attr;

/// Power state when the config leaves it out.
pub const DEFAULT_POWER_STATE: &str = "RUNNING";
/// Default clean shutdown bound, in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT: i64 = 90;
/// Smallest memory size the server accepts, in MB.
pub const MIN_MEMORY_MB: i64 = 256;

/// Config, plan and state of a `truenas_vm`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmModel {
    /// Server id, as a string
    pub id: Attr<String>,
    /// VM name
    pub name: Attr<String>,
    /// Free text
    pub description: Attr<String>,
    /// Virtual sockets
    pub vcpus: Attr<i64>,
    /// Cores per socket
    pub cores: Attr<i64>,
    /// Threads per core
    pub threads: Attr<i64>,
    /// Memory in MB
    pub memory: Attr<i64>,
    /// Ballooning floor in MB
    pub min_memory: Attr<i64>,
    /// Start with the host
    pub autostart: Attr<bool>,
    /// `LOCAL` or `UTC`
    pub time: Attr<String>,
    /// `UEFI` or `UEFI_CSM`
    pub bootloader: Attr<String>,
    /// `CUSTOM`, `HOST-MODEL` or `HOST-PASSTHROUGH`
    pub cpu_mode: Attr<String>,
    /// CPU model for `CUSTOM` mode
    pub cpu_model: Attr<String>,
    /// Seconds to wait for a clean shutdown
    pub shutdown_timeout: Attr<i64>,
    /// `RUNNING` or `STOPPED`
    pub state: Attr<String>,
    /// Zvol disks
    pub disk: Vec<DiskDevice>,
    /// File-backed disks
    pub raw: Vec<RawDevice>,
    /// ISO images
    pub cdrom: Vec<CdromDevice>,
    /// Network interfaces
    pub nic: Vec<NicDevice>,
    /// SPICE displays
    pub display: Vec<DisplayDevice>,
    /// PCI passthrough
    pub pci: Vec<PciDevice>,
    /// USB passthrough
    pub usb: Vec<UsbDevice>,
}

impl VmModel {
    /// Parsed server id.
    pub fn vm_id(&self) -> Option<VmId> {
        self.id.get().and_then(|id| VmId::parse_str(id).ok())
    }

    /// Desired power state, upper-cased.
    #[must_use]
    pub fn power_state(&self) -> String {
        self.state
            .get()
            .map_or(DEFAULT_POWER_STATE, String::as_str)
            .to_uppercase()
    }

    /// Payload for `vm.create` and `vm.update`.
    #[must_use]
    pub fn to_request(&self) -> VmRequest {
        VmRequest {
            name: self.name.get_or(String::new()),
            description: self.description.get_or(String::new()),
            vcpus: self.vcpus.get_or(1),
            cores: self.cores.get_or(1),
            threads: self.threads.get_or(1),
            memory: self.memory.get_or(MIN_MEMORY_MB),
            min_memory: self.min_memory.get().copied(),
            autostart: self.autostart.get_or(true),
            time: self.time.get_or("LOCAL".to_string()),
            bootloader: self.bootloader.get_or("UEFI".to_string()),
            cpu_mode: self.cpu_mode.get_or("CUSTOM".to_string()),
            cpu_model: self.cpu_model.get().cloned(),
            shutdown_timeout: self.shutdown_timeout.get_or(DEFAULT_SHUTDOWN_TIMEOUT),
        }
    }

    /// True when every scalar attribute is equal.
    #[must_use]
    pub fn same_scalars(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.vcpus == other.vcpus
            && self.cores == other.cores
            && self.threads == other.threads
            && self.memory == other.memory
            && self.min_memory == other.min_memory
            && self.autostart == other.autostart
            && self.time == other.time
            && self.bootloader == other.bootloader
            && self.cpu_mode == other.cpu_mode
            && self.cpu_model == other.cpu_model
            && self.shutdown_timeout == other.shutdown_timeout
    }

    /// Fill unset scalars with server defaults.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.description = self.description.or_default_if_null(String::new());
        self.vcpus = self.vcpus.or_default_if_null(1);
        self.cores = self.cores.or_default_if_null(1);
        self.threads = self.threads.or_default_if_null(1);
        self.autostart = self.autostart.or_default_if_null(true);
        self.time = self.time.or_default_if_null("LOCAL".to_string());
        self.bootloader = self.bootloader.or_default_if_null("UEFI".to_string());
        self.cpu_mode = self.cpu_mode.or_default_if_null("CUSTOM".to_string());
        self.shutdown_timeout = self
            .shutdown_timeout
            .or_default_if_null(DEFAULT_SHUTDOWN_TIMEOUT);
        self.state = self
            .state
            .or_default_if_null(DEFAULT_POWER_STATE.to_string());
        self
    }
}
