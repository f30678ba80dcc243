//! Device classes and the per-class diff.
//!
//! Devices have no natural key; the only stable handle is the server id
//! stored in `device_id`. Planned devices are paired with state devices by
//! that id.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use truenas_api::models::VmDevice;
use truenas_core::ids::DeviceId;

use crate::framework::{Attr, SemanticEquality, SizeString};

/// One device class of the VM model.
pub trait DeviceBlock: Clone + Send + Sync {
    /// Server `dtype`.
    const DTYPE: &'static str;

    /// Block name in the schema and model.
    const BLOCK: &'static str;

    /// Payload keys the server only honours on create.
    const CREATE_ONLY: &'static [&'static str] = &[];

    /// Server id as stored.
    fn device_id(&self) -> &Attr<String>;

    /// Record the server id.
    fn set_device_id(&mut self, id: Attr<String>);

    /// Boot / attach order.
    fn order(&self) -> &Attr<i64>;

    /// Record the order.
    fn set_order(&mut self, order: Attr<i64>);

    /// Class-specific wire attributes, without `dtype`.
    fn payload(&self) -> Map<String, Value>;

    /// True when every field this device sets matches `state`. Unset fields
    /// are left to the server and never cause an update.
    fn same_payload(&self, state: &Self) -> bool;

    /// Map a server record. `prior` supplies fields the server never echoes.
    fn from_server(device: &VmDevice, prior: Option<&Self>) -> Self;

    /// Wire attributes including `dtype`.
    fn attributes(&self) -> Map<String, Value> {
        let mut attributes = self.payload();
        attributes.insert("dtype".to_string(), Value::from(Self::DTYPE));
        attributes
    }

    /// Wire attributes for `vm.device.update`, without create-only keys.
    fn update_attributes(&self) -> Map<String, Value> {
        let mut attributes = self.attributes();
        for key in Self::CREATE_ONLY {
            attributes.remove(*key);
        }
        attributes
    }

    /// Parsed server id, if set and well-formed.
    fn id(&self) -> Option<DeviceId> {
        self.device_id()
            .get()
            .and_then(|id| DeviceId::parse_str(id).ok())
    }
}

fn put<T: Clone + Into<Value>>(map: &mut Map<String, Value>, key: &str, value: &Attr<T>) {
    if let Attr::Known(value) = value {
        map.insert(key.to_string(), value.clone().into());
    }
}

/// Planned value matches state, or is left to the server.
fn same<T: PartialEq>(planned: &Attr<T>, state: &Attr<T>) -> bool {
    planned.get().map_or(true, |value| state.get() == Some(value))
}

fn text(device: &VmDevice, key: &str) -> Attr<String> {
    device.str_attr(key).map(str::to_string).into()
}

fn int(device: &VmDevice, key: &str) -> Attr<i64> {
    device.int_attr(key).into()
}

fn flag(device: &VmDevice, key: &str) -> Attr<bool> {
    device.bool_attr(key).into()
}

fn id_of(device: &VmDevice) -> Attr<String> {
    Attr::Known(device.id.to_string())
}

macro_rules! device_common {
    () => {
        fn device_id(&self) -> &Attr<String> {
            &self.device_id
        }

        fn set_device_id(&mut self, id: Attr<String>) {
            self.device_id = id;
        }

        fn order(&self) -> &Attr<i64> {
            &self.order
        }

        fn set_order(&mut self, order: Attr<i64>) {
            self.order = order;
        }
    };
}

/// Zvol-backed disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskDevice {
    /// Server id
    pub device_id: Attr<String>,
    /// Boot order
    pub order: Attr<i64>,
    /// Zvol path under `/dev/zvol`
    pub path: Attr<String>,
    /// `AHCI` or `VIRTIO`
    pub disk_type: Attr<String>,
    /// `NATIVE`, `THREADS` or `IO_URING`
    pub iotype: Attr<String>,
    /// Serial presented to the guest
    pub serial: Attr<String>,
    /// 512 or 4096
    pub logical_sectorsize: Attr<i64>,
    /// 512 or 4096
    pub physical_sectorsize: Attr<i64>,
}

impl DeviceBlock for DiskDevice {
    const DTYPE: &'static str = "DISK";
    const BLOCK: &'static str = "disk";

    device_common!();

    fn payload(&self) -> Map<String, Value> {
        let mut map = Map::new();
        put(&mut map, "path", &self.path);
        put(&mut map, "type", &self.disk_type);
        put(&mut map, "iotype", &self.iotype);
        put(&mut map, "serial", &self.serial);
        put(&mut map, "logical_sectorsize", &self.logical_sectorsize);
        put(&mut map, "physical_sectorsize", &self.physical_sectorsize);
        map
    }

    fn same_payload(&self, state: &Self) -> bool {
        same(&self.path, &state.path)
            && same(&self.disk_type, &state.disk_type)
            && same(&self.logical_sectorsize, &state.logical_sectorsize)
            && same(&self.physical_sectorsize, &state.physical_sectorsize)
            && same(&self.iotype, &state.iotype)
            && same(&self.serial, &state.serial)
    }

    fn from_server(device: &VmDevice, _prior: Option<&Self>) -> Self {
        Self {
            device_id: id_of(device),
            order: device.order.into(),
            path: text(device, "path"),
            disk_type: text(device, "type"),
            iotype: text(device, "iotype"),
            serial: text(device, "serial"),
            logical_sectorsize: int(device, "logical_sectorsize"),
            physical_sectorsize: int(device, "physical_sectorsize"),
        }
    }
}

/// File-backed raw disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDevice {
    /// Server id
    pub device_id: Attr<String>,
    /// Boot order
    pub order: Attr<i64>,
    /// Image file path
    pub path: Attr<String>,
    /// `AHCI` or `VIRTIO`
    pub disk_type: Attr<String>,
    /// Boot from this device
    pub boot: Attr<bool>,
    /// The image already exists; only sent on create
    pub exists: Attr<bool>,
    /// Image size, e.g. `20G`
    pub size: Attr<SizeString>,
    /// `NATIVE`, `THREADS` or `IO_URING`
    pub iotype: Attr<String>,
    /// Serial presented to the guest
    pub serial: Attr<String>,
    /// 512 or 4096
    pub logical_sectorsize: Attr<i64>,
    /// 512 or 4096
    pub physical_sectorsize: Attr<i64>,
}

impl DeviceBlock for RawDevice {
    const DTYPE: &'static str = "RAW";
    const BLOCK: &'static str = "raw";
    const CREATE_ONLY: &'static [&'static str] = &["exists"];

    device_common!();

    fn payload(&self) -> Map<String, Value> {
        let mut map = Map::new();
        put(&mut map, "path", &self.path);
        put(&mut map, "type", &self.disk_type);
        put(&mut map, "boot", &self.boot);
        put(&mut map, "exists", &self.exists);
        if let Some(bytes) = self.size.get().and_then(SizeString::bytes) {
            map.insert("size".to_string(), Value::from(bytes));
        }
        put(&mut map, "iotype", &self.iotype);
        put(&mut map, "serial", &self.serial);
        put(&mut map, "logical_sectorsize", &self.logical_sectorsize);
        put(&mut map, "physical_sectorsize", &self.physical_sectorsize);
        map
    }

    fn same_payload(&self, state: &Self) -> bool {
        let same_size = self
            .size
            .get()
            .map_or(true, |planned| state.size.get().is_some_and(|s| s.semantic_equal(planned)));
        same(&self.path, &state.path)
            && same(&self.disk_type, &state.disk_type)
            && same(&self.boot, &state.boot)
            && same_size
            && same(&self.iotype, &state.iotype)
            && same(&self.serial, &state.serial)
            && same(&self.logical_sectorsize, &state.logical_sectorsize)
            && same(&self.physical_sectorsize, &state.physical_sectorsize)
    }

    fn from_server(device: &VmDevice, prior: Option<&Self>) -> Self {
        let observed: Attr<SizeString> = device
            .attributes
            .get("size")
            .and_then(Value::as_u64)
            .map(SizeString::from_bytes)
            .into();
        let size = match (prior.and_then(|p| p.size.get()), observed.get()) {
            (Some(spelled), Some(size)) if spelled.semantic_equal(size) => Attr::Known(spelled.clone()),
            _ => observed,
        };
        Self {
            device_id: id_of(device),
            order: device.order.into(),
            path: text(device, "path"),
            disk_type: text(device, "type"),
            boot: flag(device, "boot"),
            exists: prior.map_or(Attr::Null, |p| p.exists.clone()),
            size,
            iotype: text(device, "iotype"),
            serial: text(device, "serial"),
            logical_sectorsize: int(device, "logical_sectorsize"),
            physical_sectorsize: int(device, "physical_sectorsize"),
        }
    }
}

/// ISO image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CdromDevice {
    /// Server id
    pub device_id: Attr<String>,
    /// Boot order
    pub order: Attr<i64>,
    /// ISO path under `/mnt/`
    pub path: Attr<String>,
}

impl DeviceBlock for CdromDevice {
    const DTYPE: &'static str = "CDROM";
    const BLOCK: &'static str = "cdrom";

    device_common!();

    fn payload(&self) -> Map<String, Value> {
        let mut map = Map::new();
        put(&mut map, "path", &self.path);
        map
    }

    fn same_payload(&self, state: &Self) -> bool {
        same(&self.path, &state.path)
    }

    fn from_server(device: &VmDevice, _prior: Option<&Self>) -> Self {
        Self {
            device_id: id_of(device),
            order: device.order.into(),
            path: text(device, "path"),
        }
    }
}

/// Network interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NicDevice {
    /// Server id
    pub device_id: Attr<String>,
    /// Attach order
    pub order: Attr<i64>,
    /// `E1000` or `VIRTIO`
    pub nic_type: Attr<String>,
    /// Host interface to attach to
    pub nic_attach: Attr<String>,
    /// MAC address; generated when unset
    pub mac: Attr<String>,
    /// Pass guest RX filters through
    pub trust_guest_rx_filters: Attr<bool>,
}

impl DeviceBlock for NicDevice {
    const DTYPE: &'static str = "NIC";
    const BLOCK: &'static str = "nic";

    device_common!();

    fn payload(&self) -> Map<String, Value> {
        let mut map = Map::new();
        put(&mut map, "type", &self.nic_type);
        put(&mut map, "nic_attach", &self.nic_attach);
        put(&mut map, "mac", &self.mac);
        put(&mut map, "trust_guest_rx_filters", &self.trust_guest_rx_filters);
        map
    }

    fn same_payload(&self, state: &Self) -> bool {
        same(&self.nic_type, &state.nic_type)
            && same(&self.nic_attach, &state.nic_attach)
            && same(&self.mac, &state.mac)
            && same(&self.trust_guest_rx_filters, &state.trust_guest_rx_filters)
    }

    fn from_server(device: &VmDevice, _prior: Option<&Self>) -> Self {
        Self {
            device_id: id_of(device),
            order: device.order.into(),
            nic_type: text(device, "type"),
            nic_attach: text(device, "nic_attach"),
            mac: text(device, "mac"),
            trust_guest_rx_filters: flag(device, "trust_guest_rx_filters"),
        }
    }
}

/// SPICE display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayDevice {
    /// Server id
    pub device_id: Attr<String>,
    /// Attach order
    pub order: Attr<i64>,
    /// `SPICE`
    pub display_type: Attr<String>,
    /// Screen resolution, e.g. `1024x768`
    pub resolution: Attr<String>,
    /// SPICE port; assigned when unset
    pub port: Attr<i64>,
    /// Web client port; assigned when unset
    pub web_port: Attr<i64>,
    /// Bind address
    pub bind: Attr<String>,
    /// Hold boot until a client connects
    pub wait: Attr<bool>,
    /// Connection password; never echoed back
    pub password: Attr<String>,
    /// Enable the web client
    pub web: Attr<bool>,
}

impl DeviceBlock for DisplayDevice {
    const DTYPE: &'static str = "DISPLAY";
    const BLOCK: &'static str = "display";

    device_common!();

    fn payload(&self) -> Map<String, Value> {
        let mut map = Map::new();
        put(&mut map, "type", &self.display_type);
        put(&mut map, "resolution", &self.resolution);
        put(&mut map, "port", &self.port);
        put(&mut map, "web_port", &self.web_port);
        put(&mut map, "bind", &self.bind);
        put(&mut map, "wait", &self.wait);
        put(&mut map, "password", &self.password);
        put(&mut map, "web", &self.web);
        map
    }

    fn same_payload(&self, state: &Self) -> bool {
        same(&self.display_type, &state.display_type)
            && same(&self.resolution, &state.resolution)
            && same(&self.port, &state.port)
            && same(&self.web_port, &state.web_port)
            && same(&self.bind, &state.bind)
            && same(&self.wait, &state.wait)
            && same(&self.password, &state.password)
            && same(&self.web, &state.web)
    }

    fn from_server(device: &VmDevice, prior: Option<&Self>) -> Self {
        let password = match text(device, "password") {
            Attr::Known(password) if !password.is_empty() => Attr::Known(password),
            _ => prior.map_or(Attr::Null, |p| p.password.clone()),
        };
        Self {
            device_id: id_of(device),
            order: device.order.into(),
            display_type: text(device, "type"),
            resolution: text(device, "resolution"),
            port: int(device, "port"),
            web_port: int(device, "web_port"),
            bind: text(device, "bind"),
            wait: flag(device, "wait"),
            password,
            web: flag(device, "web"),
        }
    }
}

/// PCI passthrough.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PciDevice {
    /// Server id
    pub device_id: Attr<String>,
    /// Attach order
    pub order: Attr<i64>,
    /// Host device, e.g. `pci_0000_3b_00_0`
    pub pptdev: Attr<String>,
}

impl DeviceBlock for PciDevice {
    const DTYPE: &'static str = "PCI";
    const BLOCK: &'static str = "pci";

    device_common!();

    fn payload(&self) -> Map<String, Value> {
        let mut map = Map::new();
        put(&mut map, "pptdev", &self.pptdev);
        map
    }

    fn same_payload(&self, state: &Self) -> bool {
        same(&self.pptdev, &state.pptdev)
    }

    fn from_server(device: &VmDevice, _prior: Option<&Self>) -> Self {
        Self {
            device_id: id_of(device),
            order: device.order.into(),
            pptdev: text(device, "pptdev"),
        }
    }
}

/// USB passthrough.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsbDevice {
    /// Server id
    pub device_id: Attr<String>,
    /// Attach order
    pub order: Attr<i64>,
    /// Emulated controller, e.g. `nec-xhci`
    pub controller_type: Attr<String>,
    /// Host device, e.g. `usb_0_1_2`
    pub device: Attr<String>,
}

impl DeviceBlock for UsbDevice {
    const DTYPE: &'static str = "USB";
    const BLOCK: &'static str = "usb";

    device_common!();

    fn payload(&self) -> Map<String, Value> {
        let mut map = Map::new();
        put(&mut map, "controller_type", &self.controller_type);
        put(&mut map, "device", &self.device);
        map
    }

    fn same_payload(&self, state: &Self) -> bool {
        same(&self.controller_type, &state.controller_type) && same(&self.device, &state.device)
    }

    fn from_server(device: &VmDevice, _prior: Option<&Self>) -> Self {
        Self {
            device_id: id_of(device),
            order: device.order.into(),
            controller_type: text(device, "controller_type"),
            device: text(device, "device"),
        }
    }
}

/// Calls needed to bring one class from state to plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDiff {
    /// State devices the plan no longer references
    pub delete: Vec<DeviceId>,
    /// Indexes of planned devices to create
    pub create: Vec<usize>,
    /// Indexes of planned devices to update, with their ids
    pub update: Vec<(usize, DeviceId)>,
}

impl ClassDiff {
    /// True when nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delete.is_empty() && self.create.is_empty() && self.update.is_empty()
    }
}

/// Pair `planned` with `state` by device id.
///
/// A planned id that is missing, malformed or absent from state means create.
#[must_use]
pub fn diff_class<D: DeviceBlock>(planned: &[D], state: &[D]) -> ClassDiff {
    let state_by_id: HashMap<DeviceId, &D> = state
        .iter()
        .filter_map(|device| device.id().map(|id| (id, device)))
        .collect();
    let planned_ids: HashSet<DeviceId> = planned.iter().filter_map(DeviceBlock::id).collect();

    let mut diff = ClassDiff {
        delete: state
            .iter()
            .filter_map(DeviceBlock::id)
            .filter(|id| !planned_ids.contains(id))
            .collect(),
        ..ClassDiff::default()
    };

    for (index, device) in planned.iter().enumerate() {
        let existing = device
            .id()
            .and_then(|id| state_by_id.get(&id).map(|current| (id, *current)));
        match existing {
            None => diff.create.push(index),
            Some((id, current)) => {
                if !device.same_payload(current) || !same(device.order(), current.order()) {
                    diff.update.push((index, id));
                }
            }
        }
    }
    diff
}

/// Fill in `device_id` on planned devices the host left unknown.
///
/// A planned device takes the id of an unclaimed prior device with the same
/// payload, else of the unclaimed prior device at the same index. Anything
/// left over is new.
pub fn carry_device_ids<D: DeviceBlock>(prior: &[D], planned: &mut [D]) {
    let mut claimed: HashSet<usize> = HashSet::new();
    for device in planned.iter() {
        if let Some(id) = device.device_id().get() {
            if let Some(index) = prior.iter().position(|p| p.device_id().get() == Some(id)) {
                claimed.insert(index);
            }
        }
    }

    let mut pending = Vec::new();
    for (index, device) in planned.iter_mut().enumerate() {
        if device.device_id().is_known() {
            continue;
        }
        let matching = prior.iter().enumerate().position(|(i, p)| {
            !claimed.contains(&i)
                && p.device_id().is_known()
                && device.same_payload(p)
                && p.same_payload(device)
        });
        match matching {
            Some(i) => {
                claimed.insert(i);
                adopt(device, &prior[i]);
            }
            None => pending.push(index),
        }
    }

    for index in pending {
        let device = &mut planned[index];
        match prior.get(index) {
            Some(p) if !claimed.contains(&index) && p.device_id().is_known() => {
                claimed.insert(index);
                adopt(device, p);
            }
            _ => device.set_device_id(Attr::Unknown),
        }
    }
}

fn adopt<D: DeviceBlock>(device: &mut D, prior: &D) {
    device.set_device_id(prior.device_id().clone());
    if !device.order().is_known() {
        device.set_order(prior.order().clone());
    }
}
