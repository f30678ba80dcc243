//! VM reconciler.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use truenas_api::models::{DeviceRequest, StopOptions, Vm};
use truenas_api::VmService;
use truenas_core::ids::{DeviceId, VmId};
use truenas_core::Error;

use super::devices::{
    carry_device_ids, diff_class, CdromDevice, ClassDiff, DeviceBlock, DiskDevice, DisplayDevice,
    NicDevice, PciDevice, RawDevice, UsbDevice,
};
use super::mapping::vm_from_server;
use super::model::{VmModel, DEFAULT_POWER_STATE, DEFAULT_SHUTDOWN_TIMEOUT, MIN_MEMORY_MB};
use crate::framework::{
    Attr, Attribute, AttributeType, Block, Diagnostics, OperationContext, ReadOutcome, Resource,
    Response, Schema,
};
use crate::validators::{require, validate_int, validate_str, Validator};

const SUMMARY_CREATE: &str = "Unable to Create VM";
const SUMMARY_READ: &str = "Unable to Read VM";
const SUMMARY_UPDATE: &str = "Unable to Update VM";
const SUMMARY_DELETE: &str = "Unable to Delete VM";
const SUMMARY_START: &str = "Unable to Start VM";
const SUMMARY_STOP: &str = "Unable to Stop VM";
const SUMMARY_CREATE_DEVICE: &str = "Unable to Create VM Device";
const SUMMARY_UPDATE_DEVICE: &str = "Unable to Update VM Device";
const SUMMARY_DELETE_DEVICE: &str = "Unable to Delete VM Device";
const SUMMARY_BAD_ID: &str = "Invalid VM ID";

const POWER_STATES: &[&str] = &["RUNNING", "STOPPED"];
const TIME_MODES: &[&str] = &["LOCAL", "UTC"];
const BOOTLOADERS: &[&str] = &["UEFI", "UEFI_CSM"];
const CPU_MODES: &[&str] = &["CUSTOM", "HOST-MODEL", "HOST-PASSTHROUGH"];
const DISK_BUSES: &[&str] = &["AHCI", "VIRTIO"];
const IO_TYPES: &[&str] = &["NATIVE", "THREADS", "IO_URING"];
const SECTOR_SIZES: &[&str] = &["512", "4096"];
const NIC_TYPES: &[&str] = &["E1000", "VIRTIO"];
const DISPLAY_TYPES: &[&str] = &["SPICE"];
const RESOLUTIONS: &[&str] = &[
    "1920x1200", "1920x1080", "1600x1200", "1600x900", "1400x1050", "1280x1024", "1280x720",
    "1024x768", "800x600", "640x480",
];
const USB_CONTROLLERS: &[&str] = &[
    "piix3-uhci", "piix4-uhci", "ehci", "ich9-ehci1", "vt82c686b-uhci", "pci-ohci", "nec-xhci",
    "qemu-xhci",
];

/// `truenas_vm` resource.
pub struct VmResource {
    vms: Arc<dyn VmService>,
}

/// A failed call with the summary the host should see.
struct Failure {
    summary: &'static str,
    error: Error,
}

impl Failure {
    const fn new(summary: &'static str, error: Error) -> Self {
        Self { summary, error }
    }
}

fn bad_id(id: &Attr<String>) -> Error {
    Error::ValidationError(format!(
        "VM id `{}` is not an integer",
        id.get().map_or("", String::as_str)
    ))
}

impl VmResource {
    /// Resource backed by `vms`.
    #[must_use]
    pub fn new(vms: Arc<dyn VmService>) -> Self {
        Self { vms }
    }

    async fn delete_devices(&self, ids: &[DeviceId]) -> Result<(), Failure> {
        for id in ids {
            info!(device = %id, "Deleting VM device");
            match self.vms.delete_device(*id).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => debug!(device = %id, "Device already gone"),
                Err(err) => return Err(Failure::new(SUMMARY_DELETE_DEVICE, err)),
            }
        }
        Ok(())
    }

    /// Create and update one class; deletions were issued already.
    async fn apply_class<D: DeviceBlock>(
        &self,
        vm: VmId,
        planned: &mut [D],
        diff: &ClassDiff,
    ) -> Result<(), Failure> {
        for &index in &diff.create {
            let device = &mut planned[index];
            let request = DeviceRequest {
                vm: Some(vm),
                order: device.order().get().copied(),
                attributes: device.attributes(),
            };
            let created = self
                .vms
                .create_device(request)
                .await
                .map_err(|e| Failure::new(SUMMARY_CREATE_DEVICE, e))?;
            info!(vm = %vm, device = %created.id, dtype = D::DTYPE, "Created VM device");
            device.set_device_id(Attr::Known(created.id.to_string()));
            if !device.order().is_known() {
                device.set_order(created.order.into());
            }
        }
        for (index, id) in &diff.update {
            let device = &planned[*index];
            let request = DeviceRequest {
                vm: None,
                order: device.order().get().copied(),
                attributes: device.update_attributes(),
            };
            self.vms
                .update_device(*id, request)
                .await
                .map_err(|e| Failure::new(SUMMARY_UPDATE_DEVICE, e))?;
            info!(vm = %vm, device = %id, dtype = D::DTYPE, "Updated VM device");
        }
        Ok(())
    }

    /// Bring every device class of `planned` in line with `state`.
    async fn sync_devices(&self, vm: VmId, planned: &mut VmModel, state: &VmModel) -> Result<(), Failure> {
        let disk = diff_class(&planned.disk, &state.disk);
        let raw = diff_class(&planned.raw, &state.raw);
        let cdrom = diff_class(&planned.cdrom, &state.cdrom);
        let nic = diff_class(&planned.nic, &state.nic);
        let display = diff_class(&planned.display, &state.display);
        let pci = diff_class(&planned.pci, &state.pci);
        let usb = diff_class(&planned.usb, &state.usb);

        let stale: Vec<DeviceId> = [&disk, &raw, &cdrom, &nic, &display, &pci, &usb]
            .into_iter()
            .flat_map(|diff| diff.delete.iter().copied())
            .collect();
        self.delete_devices(&stale).await?;

        self.apply_class(vm, &mut planned.disk, &disk).await?;
        self.apply_class(vm, &mut planned.raw, &raw).await?;
        self.apply_class(vm, &mut planned.cdrom, &cdrom).await?;
        self.apply_class(vm, &mut planned.nic, &nic).await?;
        self.apply_class(vm, &mut planned.display, &display).await?;
        self.apply_class(vm, &mut planned.pci, &pci).await?;
        self.apply_class(vm, &mut planned.usb, &usb).await
    }

    async fn apply_power(&self, vm: VmId, desired: &str, observed: &str) -> Result<(), Failure> {
        if desired.eq_ignore_ascii_case(observed) {
            return Ok(());
        }
        if desired.eq_ignore_ascii_case("RUNNING") {
            info!(vm = %vm, "Starting VM");
            self.vms
                .start_vm(vm)
                .await
                .map_err(|e| Failure::new(SUMMARY_START, e))
        } else {
            info!(vm = %vm, "Stopping VM");
            self.vms
                .stop_vm(vm, StopOptions::graceful())
                .await
                .map_err(|e| Failure::new(SUMMARY_STOP, e))
        }
    }

    /// Re-read after apply; user spellings come from `planned`.
    async fn read_back(&self, vm: VmId, planned: &VmModel) -> Result<VmModel, Failure> {
        match self.vms.get_vm(vm).await {
            Ok(Some(found)) => Ok(merge_user_spelling(vm_from_server(&found, planned), planned)),
            Ok(None) => Err(Failure::new(
                SUMMARY_READ,
                Error::NotFound(format!("VM {vm} not found after apply")),
            )),
            Err(err) => Err(Failure::new(SUMMARY_READ, err)),
        }
    }

    /// State after a failed apply: what the server holds, or failing that
    /// the plan with every device the server never confirmed removed.
    async fn recover(&self, vm: VmId, planned: VmModel, failure: Failure) -> Response<VmModel> {
        let confirmed = confirmed_devices(planned);
        match self.read_back(vm, &confirmed).await {
            Ok(state) => partial(state, failure),
            Err(reread) => {
                debug!(vm = %vm, error = %reread.error, "Re-read after failed apply failed");
                partial(confirmed, failure)
            }
        }
    }
}

fn retain_known<D: DeviceBlock>(devices: &mut Vec<D>) {
    devices.retain(|device| device.id().is_some());
}

/// Drop planned devices that carry no server id.
fn confirmed_devices(mut planned: VmModel) -> VmModel {
    retain_known(&mut planned.disk);
    retain_known(&mut planned.raw);
    retain_known(&mut planned.cdrom);
    retain_known(&mut planned.nic);
    retain_known(&mut planned.display);
    retain_known(&mut planned.pci);
    retain_known(&mut planned.usb);
    planned
}

/// Keep the planned spelling of `state` when it names the observed state.
fn merge_user_spelling(mut observed: VmModel, planned: &VmModel) -> VmModel {
    if let (Some(desired), Some(actual)) = (planned.state.get(), observed.state.get()) {
        if desired.eq_ignore_ascii_case(actual) {
            observed.state = planned.state.clone();
        }
    }
    observed
}

/// Record `state` and report the failure.
fn partial(state: VmModel, failure: Failure) -> Response<VmModel> {
    let mut diagnostics = Diagnostics::new();
    diagnostics.add_api_error(failure.summary, &failure.error);
    Response::with_diagnostics(state, diagnostics)
}

fn validate_devices(diags: &mut Diagnostics, config: &VmModel) {
    let path = [Validator::AbsolutePath];
    for (i, disk) in config.disk.iter().enumerate() {
        require(diags, &format!("disk.{i}.path"), &disk.path);
        validate_str(diags, &format!("disk.{i}.path"), &disk.path, &path);
        validate_str(diags, &format!("disk.{i}.type"), &disk.disk_type, &[Validator::one_of(DISK_BUSES)]);
        validate_str(diags, &format!("disk.{i}.iotype"), &disk.iotype, &[Validator::one_of(IO_TYPES)]);
        validate_sectors(diags, &format!("disk.{i}"), &disk.logical_sectorsize, &disk.physical_sectorsize);
    }
    for (i, raw) in config.raw.iter().enumerate() {
        require(diags, &format!("raw.{i}.path"), &raw.path);
        validate_str(diags, &format!("raw.{i}.path"), &raw.path, &path);
        validate_str(diags, &format!("raw.{i}.type"), &raw.disk_type, &[Validator::one_of(DISK_BUSES)]);
        validate_str(diags, &format!("raw.{i}.iotype"), &raw.iotype, &[Validator::one_of(IO_TYPES)]);
        validate_sectors(diags, &format!("raw.{i}"), &raw.logical_sectorsize, &raw.physical_sectorsize);
        if let Some(size) = raw.size.get() {
            if size.bytes().is_none() {
                diags.add_attribute_error(
                    format!("raw.{i}.size"),
                    "Invalid Attribute Value",
                    format!("size must be a byte count such as 20G, got \"{size}\""),
                );
            }
        }
    }
    for (i, cdrom) in config.cdrom.iter().enumerate() {
        require(diags, &format!("cdrom.{i}.path"), &cdrom.path);
        validate_str(
            diags,
            &format!("cdrom.{i}.path"),
            &cdrom.path,
            &[Validator::AbsolutePath, Validator::PathPrefix("/mnt/")],
        );
    }
    for (i, nic) in config.nic.iter().enumerate() {
        validate_str(diags, &format!("nic.{i}.type"), &nic.nic_type, &[Validator::one_of(NIC_TYPES)]);
        validate_str(diags, &format!("nic.{i}.mac"), &nic.mac, &[Validator::MacAddress]);
    }
    let port = [Validator::IntRange { min: 5900, max: 65535 }];
    for (i, display) in config.display.iter().enumerate() {
        validate_str(
            diags,
            &format!("display.{i}.type"),
            &display.display_type,
            &[Validator::one_of(DISPLAY_TYPES)],
        );
        validate_str(
            diags,
            &format!("display.{i}.resolution"),
            &display.resolution,
            &[Validator::one_of(RESOLUTIONS)],
        );
        validate_int(diags, &format!("display.{i}.port"), &display.port, &port);
        validate_int(diags, &format!("display.{i}.web_port"), &display.web_port, &port);
    }
    for (i, pci) in config.pci.iter().enumerate() {
        require(diags, &format!("pci.{i}.pptdev"), &pci.pptdev);
        validate_str(diags, &format!("pci.{i}.pptdev"), &pci.pptdev, &[Validator::NonEmpty]);
    }
    for (i, usb) in config.usb.iter().enumerate() {
        validate_str(
            diags,
            &format!("usb.{i}.controller_type"),
            &usb.controller_type,
            &[Validator::one_of(USB_CONTROLLERS)],
        );
    }
}

fn validate_sectors(diags: &mut Diagnostics, prefix: &str, logical: &Attr<i64>, physical: &Attr<i64>) {
    for (name, value) in [("logical_sectorsize", logical), ("physical_sectorsize", physical)] {
        let rendered = value.clone().map(|v| v.to_string());
        validate_str(diags, &format!("{prefix}.{name}"), &rendered, &[Validator::one_of(SECTOR_SIZES)]);
    }
}

fn device_attrs(extra: Vec<Attribute>) -> Vec<Attribute> {
    let mut attributes = vec![
        Attribute::computed("device_id", AttributeType::String)
            .plan_modifier("carry_device_id")
            .describe("Server-assigned device id."),
        Attribute::optional("order", AttributeType::Int).and_computed(),
    ];
    attributes.extend(extra);
    attributes
}

fn disk_attrs() -> Vec<Attribute> {
    vec![
        Attribute::optional("type", AttributeType::String).validator(Validator::one_of(DISK_BUSES)),
        Attribute::optional("iotype", AttributeType::String).validator(Validator::one_of(IO_TYPES)),
        Attribute::optional("serial", AttributeType::String).and_computed(),
        Attribute::optional("logical_sectorsize", AttributeType::Int),
        Attribute::optional("physical_sectorsize", AttributeType::Int),
    ]
}

#[async_trait]
impl Resource for VmResource {
    type Model = VmModel;

    fn type_name(&self) -> &'static str {
        "truenas_vm"
    }

    fn schema(&self) -> Schema {
        let path = |name| {
            Attribute::required(name, AttributeType::String).validator(Validator::AbsolutePath)
        };
        let mut disk = vec![path("path")];
        disk.extend(disk_attrs());
        let mut raw = vec![
            path("path"),
            Attribute::optional("boot", AttributeType::Bool),
            Attribute::optional("exists", AttributeType::Bool)
                .describe("The image already exists. Only sent on create."),
            Attribute::optional("size", AttributeType::Size),
        ];
        raw.extend(disk_attrs());
        let port = Validator::IntRange { min: 5900, max: 65535 };

        Schema::new(
            "Virtual machine with its devices.",
            vec![
                Attribute::computed("id", AttributeType::String),
                Attribute::required("name", AttributeType::String).validator(Validator::NonEmpty),
                Attribute::optional("description", AttributeType::String).with_default(""),
                Attribute::optional("vcpus", AttributeType::Int)
                    .with_default(1)
                    .validator(Validator::AtLeast(1)),
                Attribute::optional("cores", AttributeType::Int)
                    .with_default(1)
                    .validator(Validator::AtLeast(1)),
                Attribute::optional("threads", AttributeType::Int)
                    .with_default(1)
                    .validator(Validator::AtLeast(1)),
                Attribute::required("memory", AttributeType::Int)
                    .validator(Validator::AtLeast(MIN_MEMORY_MB))
                    .describe("Memory in MB."),
                Attribute::optional("min_memory", AttributeType::Int),
                Attribute::optional("autostart", AttributeType::Bool).with_default(true),
                Attribute::optional("time", AttributeType::String)
                    .with_default("LOCAL")
                    .validator(Validator::one_of(TIME_MODES)),
                Attribute::optional("bootloader", AttributeType::String)
                    .with_default("UEFI")
                    .validator(Validator::one_of(BOOTLOADERS)),
                Attribute::optional("cpu_mode", AttributeType::String)
                    .with_default("CUSTOM")
                    .validator(Validator::one_of(CPU_MODES)),
                Attribute::optional("cpu_model", AttributeType::String),
                Attribute::optional("shutdown_timeout", AttributeType::Int)
                    .with_default(DEFAULT_SHUTDOWN_TIMEOUT)
                    .validator(Validator::IntRange { min: 5, max: 300 }),
                Attribute::optional("state", AttributeType::String)
                    .with_default(DEFAULT_POWER_STATE)
                    .validator(Validator::one_of_ignore_case(POWER_STATES)),
            ],
        )
        .with_block(Block::list(DiskDevice::BLOCK, "Zvol disks.", device_attrs(disk)))
        .with_block(Block::list(RawDevice::BLOCK, "File-backed disks.", device_attrs(raw)))
        .with_block(Block::list(
            CdromDevice::BLOCK,
            "ISO images.",
            device_attrs(vec![Attribute::required("path", AttributeType::String)
                .validator(Validator::PathPrefix("/mnt/"))]),
        ))
        .with_block(Block::list(
            NicDevice::BLOCK,
            "Network interfaces.",
            device_attrs(vec![
                Attribute::optional("type", AttributeType::String)
                    .validator(Validator::one_of(NIC_TYPES)),
                Attribute::optional("nic_attach", AttributeType::String),
                Attribute::optional("mac", AttributeType::String)
                    .and_computed()
                    .validator(Validator::MacAddress),
                Attribute::optional("trust_guest_rx_filters", AttributeType::Bool),
            ]),
        ))
        .with_block(Block::list(
            DisplayDevice::BLOCK,
            "SPICE displays.",
            device_attrs(vec![
                Attribute::optional("type", AttributeType::String)
                    .with_default("SPICE")
                    .validator(Validator::one_of(DISPLAY_TYPES)),
                Attribute::optional("resolution", AttributeType::String)
                    .validator(Validator::one_of(RESOLUTIONS)),
                Attribute::optional("port", AttributeType::Int)
                    .and_computed()
                    .validator(port.clone()),
                Attribute::optional("web_port", AttributeType::Int)
                    .and_computed()
                    .validator(port),
                Attribute::optional("bind", AttributeType::String),
                Attribute::optional("wait", AttributeType::Bool),
                Attribute::optional("password", AttributeType::String).sensitive(),
                Attribute::optional("web", AttributeType::Bool),
            ]),
        ))
        .with_block(Block::list(
            PciDevice::BLOCK,
            "PCI passthrough devices.",
            device_attrs(vec![Attribute::required("pptdev", AttributeType::String)]),
        ))
        .with_block(Block::list(
            UsbDevice::BLOCK,
            "USB passthrough devices.",
            device_attrs(vec![
                Attribute::optional("controller_type", AttributeType::String)
                    .validator(Validator::one_of(USB_CONTROLLERS)),
                Attribute::optional("device", AttributeType::String),
            ]),
        ))
    }

    fn validate_config(&self, config: &VmModel) -> Diagnostics {
        let mut diags = Diagnostics::new();
        require(&mut diags, "name", &config.name);
        require(&mut diags, "memory", &config.memory);
        validate_str(&mut diags, "name", &config.name, &[Validator::NonEmpty]);
        for (name, value) in [("vcpus", &config.vcpus), ("cores", &config.cores), ("threads", &config.threads)] {
            validate_int(&mut diags, name, value, &[Validator::AtLeast(1)]);
        }
        validate_int(&mut diags, "memory", &config.memory, &[Validator::AtLeast(MIN_MEMORY_MB)]);
        validate_int(&mut diags, "min_memory", &config.min_memory, &[Validator::AtLeast(MIN_MEMORY_MB)]);
        validate_int(
            &mut diags,
            "shutdown_timeout",
            &config.shutdown_timeout,
            &[Validator::IntRange { min: 5, max: 300 }],
        );
        validate_str(&mut diags, "time", &config.time, &[Validator::one_of(TIME_MODES)]);
        validate_str(&mut diags, "bootloader", &config.bootloader, &[Validator::one_of(BOOTLOADERS)]);
        validate_str(&mut diags, "cpu_mode", &config.cpu_mode, &[Validator::one_of(CPU_MODES)]);
        validate_str(&mut diags, "state", &config.state, &[Validator::one_of_ignore_case(POWER_STATES)]);

        if let (Some(min), Some(memory)) = (config.min_memory.get(), config.memory.get()) {
            if min > memory {
                diags.add_attribute_error(
                    "min_memory",
                    "Invalid Attribute Value",
                    format!("min_memory ({min}) must not exceed memory ({memory})"),
                );
            }
        }
        validate_devices(&mut diags, config);
        diags
    }

    fn modify_plan(&self, prior: Option<&VmModel>, planned: VmModel) -> VmModel {
        let mut planned = planned.with_defaults();
        let Some(prior) = prior else {
            planned.id = Attr::Unknown;
            return planned;
        };
        planned.id = prior.id.clone();
        carry_device_ids(&prior.disk, &mut planned.disk);
        carry_device_ids(&prior.raw, &mut planned.raw);
        carry_device_ids(&prior.cdrom, &mut planned.cdrom);
        carry_device_ids(&prior.nic, &mut planned.nic);
        carry_device_ids(&prior.display, &mut planned.display);
        carry_device_ids(&prior.pci, &mut planned.pci);
        carry_device_ids(&prior.usb, &mut planned.usb);
        planned
    }

    async fn create(&self, _ctx: &OperationContext, planned: VmModel) -> Response<VmModel> {
        let mut planned = planned.with_defaults();
        let vm: Vm = match self.vms.create_vm(planned.to_request()).await {
            Ok(vm) => vm,
            Err(err) => return Response::error(SUMMARY_CREATE, &err),
        };
        info!(vm = %vm.id, name = %vm.name, "Created VM");
        planned.id = Attr::Known(vm.id.to_string());

        let empty = VmModel::default();
        if let Err(failure) = self.sync_devices(vm.id, &mut planned, &empty).await {
            return self.recover(vm.id, planned, failure).await;
        }
        let observed = if vm.status.is_running() { "RUNNING" } else { "STOPPED" };
        if let Err(failure) = self.apply_power(vm.id, &planned.power_state(), observed).await {
            return self.recover(vm.id, planned, failure).await;
        }

        match self.read_back(vm.id, &planned).await {
            Ok(state) => Response::ok(state),
            Err(failure) => partial(confirmed_devices(planned), failure),
        }
    }

    async fn read(&self, _ctx: &OperationContext, prior: VmModel) -> Response<ReadOutcome<VmModel>> {
        let Some(id) = prior.vm_id() else {
            return Response::error(SUMMARY_BAD_ID, &bad_id(&prior.id));
        };
        match self.vms.get_vm(id).await {
            Ok(Some(vm)) => {
                debug!(vm = %id, devices = vm.devices.len(), "Read VM");
                Response::ok(ReadOutcome::Found(merge_user_spelling(
                    vm_from_server(&vm, &prior),
                    &prior,
                )))
            }
            Ok(None) => {
                info!(vm = %id, "VM no longer exists, removing from state");
                Response::ok(ReadOutcome::Removed)
            }
            Err(err) => Response::error(SUMMARY_READ, &err),
        }
    }

    async fn update(&self, _ctx: &OperationContext, prior: VmModel, planned: VmModel) -> Response<VmModel> {
        let Some(id) = prior.vm_id() else {
            return Response::error(SUMMARY_BAD_ID, &bad_id(&prior.id));
        };
        let mut planned = planned.with_defaults();
        planned.id = prior.id.clone();

        if !planned.same_scalars(&prior) {
            if let Err(err) = self.vms.update_vm(id, planned.to_request()).await {
                return Response::error(SUMMARY_UPDATE, &err);
            }
            info!(vm = %id, "Updated VM");
        }

        if let Err(failure) = self.sync_devices(id, &mut planned, &prior).await {
            return self.recover(id, planned, failure).await;
        }

        let observed = prior.power_state();
        if let Err(failure) = self.apply_power(id, &planned.power_state(), &observed).await {
            return self.recover(id, planned, failure).await;
        }

        match self.read_back(id, &planned).await {
            Ok(state) => Response::ok(state),
            Err(failure) => partial(confirmed_devices(planned), failure),
        }
    }

    async fn delete(&self, _ctx: &OperationContext, prior: VmModel) -> Response<()> {
        let Some(id) = prior.vm_id() else {
            return Response::error(SUMMARY_BAD_ID, &bad_id(&prior.id));
        };
        match self.vms.vm_status(id).await {
            Ok(status) if status.is_running() => {
                info!(vm = %id, "Force stopping VM before delete");
                if let Err(err) = self.vms.stop_vm(id, StopOptions::forced()).await {
                    return Response::error(SUMMARY_STOP, &err);
                }
            }
            Ok(_) => {}
            Err(err) if err.is_not_found() => return Response::ok(()),
            Err(err) => return Response::error(SUMMARY_DELETE, &err),
        }
        match self.vms.delete_vm(id).await {
            Ok(()) => {
                info!(vm = %id, "Deleted VM");
                Response::ok(())
            }
            Err(err) if err.is_not_found() => Response::ok(()),
            Err(err) => Response::error(SUMMARY_DELETE, &err),
        }
    }

    async fn import(&self, _ctx: &OperationContext, id: &str) -> Response<VmModel> {
        match VmId::parse_str(id) {
            Ok(vm) => Response::ok(VmModel {
                id: Attr::Known(vm.to_string()),
                ..VmModel::default()
            }),
            Err(err) => Response::error(SUMMARY_BAD_ID, &err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use serde_json::json;
    use truenas_api::models::VmDevice;
    use truenas_api::MockVmService;
    use truenas_core::ApiError;

    use crate::framework::SizeString;

    fn invalid_path() -> Error {
        ApiError::parse("[EINVAL] vm_device_create.path: Disk path is invalid").into()
    }

    fn server_vm(state: &str, devices: serde_json::Value) -> Vm {
        serde_json::from_value(json!({
            "id": 1,
            "name": "web",
            "description": "",
            "vcpus": 1,
            "cores": 2,
            "threads": 1,
            "memory": 2048,
            "min_memory": null,
            "autostart": true,
            "time": "LOCAL",
            "bootloader": "UEFI",
            "cpu_mode": "CUSTOM",
            "cpu_model": null,
            "shutdown_timeout": 90,
            "status": {"state": state},
            "devices": devices
        }))
        .unwrap()
    }

    fn disk(id: i64, path: &str) -> DiskDevice {
        DiskDevice {
            device_id: Attr::Known(id.to_string()),
            path: Attr::Known(path.to_string()),
            ..DiskDevice::default()
        }
    }

    fn base_model() -> VmModel {
        VmModel {
            id: Attr::Known("1".into()),
            name: Attr::Known("web".into()),
            memory: Attr::Known(2048),
            cores: Attr::Known(2),
            min_memory: Attr::Null,
            state: Attr::Known("RUNNING".into()),
            ..VmModel::default()
        }
        .with_defaults()
    }

    #[tokio::test]
    async fn update_diffs_devices_by_id() {
        let mut prior = base_model();
        prior.disk = vec![disk(1, "/a"), disk(3, "/c")];
        let mut planned = base_model();
        planned.disk = vec![disk(1, "/a"), disk(2, "/b")];

        let mut mock = MockVmService::new();
        let mut seq = Sequence::new();
        mock.expect_update_vm().never();
        mock.expect_update_device().never();
        mock.expect_delete_device()
            .with(eq(DeviceId::new(3)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_create_device()
            .withf(|request| {
                request.vm == Some(VmId::new(1))
                    && request.attributes.get("path") == Some(&json!("/b"))
                    && request.attributes.get("dtype") == Some(&json!("DISK"))
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(serde_json::from_value::<VmDevice>(json!({
                    "id": 4, "vm": 1, "order": 1002,
                    "attributes": {"dtype": "DISK", "path": "/b"}
                }))
                .unwrap())
            });
        mock.expect_get_vm()
            .with(eq(VmId::new(1)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(Some(server_vm(
                    "RUNNING",
                    json!([
                        {"id": 1, "order": 1001, "attributes": {"dtype": "DISK", "path": "/a"}},
                        {"id": 4, "order": 1002, "attributes": {"dtype": "DISK", "path": "/b"}}
                    ]),
                )))
            });

        let resource = VmResource::new(Arc::new(mock));
        let response = resource
            .update(&OperationContext::background(), prior, planned)
            .await;
        assert!(!response.has_error());
        let state = response.state.unwrap();
        let ids: Vec<_> = state.disk.iter().map(|d| d.device_id.clone()).collect();
        assert_eq!(ids, vec![Attr::Known("1".into()), Attr::Known("4".into())]);
    }

    fn raw(size: &str) -> RawDevice {
        RawDevice {
            device_id: Attr::Known("4".into()),
            path: Attr::Known("/mnt/tank/vm.img".into()),
            size: Attr::Known(SizeString::from(size)),
            exists: Attr::Known(false),
            ..RawDevice::default()
        }
    }

    #[tokio::test]
    async fn raw_resize_updates_device_without_exists() {
        let prior = VmModel {
            raw: vec![raw("10G")],
            ..base_model()
        };
        let planned = VmModel {
            raw: vec![raw("20G")],
            ..base_model()
        };

        let mut mock = MockVmService::new();
        let mut seq = Sequence::new();
        mock.expect_update_vm().never();
        mock.expect_create_device().never();
        mock.expect_delete_device().never();
        mock.expect_update_device()
            .withf(|id, request| {
                *id == DeviceId::new(4)
                    && request.vm.is_none()
                    && !request.attributes.contains_key("exists")
                    && request.attributes.get("size") == Some(&json!(20_000_000_000u64))
                    && request.attributes.get("dtype") == Some(&json!("RAW"))
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(serde_json::from_value::<VmDevice>(json!({
                    "id": 4, "vm": 1, "order": 1001,
                    "attributes": {"dtype": "RAW", "path": "/mnt/tank/vm.img", "size": 20_000_000_000u64}
                }))
                .unwrap())
            });
        mock.expect_get_vm()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(Some(server_vm(
                    "RUNNING",
                    json!([{"id": 4, "order": 1001, "attributes": {
                        "dtype": "RAW", "path": "/mnt/tank/vm.img", "size": 20_000_000_000u64
                    }}]),
                )))
            });

        let response = VmResource::new(Arc::new(mock))
            .update(&OperationContext::background(), prior, planned)
            .await;
        assert!(!response.has_error(), "{:?}", response.diagnostics);
        let state = response.state.unwrap();
        assert_eq!(state.raw[0].size, Attr::Known(SizeString::from("20G")));
        assert_eq!(state.raw[0].exists, Attr::Known(false));
    }

    #[tokio::test]
    async fn failed_device_create_records_server_state() {
        let prior = VmModel {
            disk: vec![disk(3, "/c")],
            ..base_model()
        };
        let planned = VmModel {
            disk: vec![DiskDevice {
                device_id: Attr::Unknown,
                ..disk(0, "/b")
            }],
            ..base_model()
        };

        let mut mock = MockVmService::new();
        let mut seq = Sequence::new();
        mock.expect_delete_device()
            .with(eq(DeviceId::new(3)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_create_device()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(invalid_path()));
        mock.expect_get_vm()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(server_vm("RUNNING", json!([])))));
        mock.expect_start_vm().never();
        mock.expect_stop_vm().never();

        let response = VmResource::new(Arc::new(mock))
            .update(&OperationContext::background(), prior, planned)
            .await;
        assert!(response.has_error());
        assert_eq!(
            response.diagnostics.errors().next().unwrap().summary,
            "Unable to Create VM Device"
        );
        let state = response.state.unwrap();
        assert!(state.disk.is_empty(), "{:?}", state.disk);
    }

    #[tokio::test]
    async fn failed_apply_without_reread_drops_unconfirmed_devices() {
        let prior = base_model();
        let planned = VmModel {
            disk: vec![DiskDevice {
                device_id: Attr::Unknown,
                ..disk(0, "/b")
            }],
            ..base_model()
        };

        let mut mock = MockVmService::new();
        mock.expect_create_device()
            .returning(|_| Err(invalid_path()));
        mock.expect_get_vm()
            .returning(|_| Err(ApiError::parse("connection refused").into()));

        let response = VmResource::new(Arc::new(mock))
            .update(&OperationContext::background(), prior, planned)
            .await;
        assert!(response.has_error());
        assert!(response.state.unwrap().disk.is_empty());
    }

    #[tokio::test]
    async fn device_ids_are_stable_across_updates() {
        let prior = VmModel {
            disk: vec![disk(1, "/a"), disk(2, "/b")],
            ..base_model()
        };
        let mut mock = MockVmService::new();
        mock.expect_update_vm().times(1).returning(|_, _| {
            Ok(server_vm("RUNNING", json!([])))
        });
        mock.expect_create_device().never();
        mock.expect_delete_device().never();
        mock.expect_update_device().never();
        mock.expect_get_vm().returning(|_| {
            Ok(Some(server_vm(
                "RUNNING",
                json!([
                    {"id": 1, "order": 1001, "attributes": {"dtype": "DISK", "path": "/a"}},
                    {"id": 2, "order": 1002, "attributes": {"dtype": "DISK", "path": "/b"}}
                ]),
            )))
        });
        let resource = VmResource::new(Arc::new(mock));

        // The host plans device blocks without their computed ids.
        let mut planned = prior.clone();
        planned.memory = Attr::Known(4096);
        for device in &mut planned.disk {
            device.device_id = Attr::Unknown;
        }
        let planned = resource.modify_plan(Some(&prior), planned);
        assert_eq!(planned.disk[0].device_id, Attr::Known("1".into()));
        assert_eq!(planned.disk[1].device_id, Attr::Known("2".into()));

        let state = resource
            .update(&OperationContext::background(), prior.clone(), planned)
            .await
            .state
            .unwrap();
        assert_eq!(state.disk[0].device_id, prior.disk[0].device_id);
        assert_eq!(state.disk[1].device_id, prior.disk[1].device_id);
    }

    #[tokio::test]
    async fn power_only_change_skips_scalar_update() {
        let prior = base_model();
        let planned = VmModel {
            state: Attr::Known("stopped".into()),
            ..prior.clone()
        };
        let mut mock = MockVmService::new();
        mock.expect_update_vm().never();
        mock.expect_start_vm().never();
        mock.expect_stop_vm()
            .with(eq(VmId::new(1)), eq(StopOptions::graceful()))
            .times(1)
            .returning(|_, _| Ok(()));
        mock.expect_get_vm()
            .returning(|_| Ok(Some(server_vm("STOPPED", json!([])))));

        let response = VmResource::new(Arc::new(mock))
            .update(&OperationContext::background(), prior, planned)
            .await;
        assert_eq!(response.state.unwrap().state, Attr::Known("stopped".into()));
    }

    #[tokio::test]
    async fn create_attaches_devices_then_starts() {
        let planned = VmModel {
            id: Attr::Unknown,
            cdrom: vec![CdromDevice {
                path: Attr::Known("/mnt/tank/iso/debian.iso".into()),
                ..CdromDevice::default()
            }],
            ..base_model()
        };
        let mut mock = MockVmService::new();
        let mut seq = Sequence::new();
        mock.expect_create_vm()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(server_vm("STOPPED", json!([]))));
        mock.expect_create_device()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(serde_json::from_value::<VmDevice>(json!({
                    "id": 11, "vm": 1, "order": 1000,
                    "attributes": {"dtype": "CDROM", "path": "/mnt/tank/iso/debian.iso"}
                }))
                .unwrap())
            });
        mock.expect_start_vm()
            .with(eq(VmId::new(1)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_get_vm().times(1).in_sequence(&mut seq).returning(|_| {
            Ok(Some(server_vm(
                "RUNNING",
                json!([{"id": 11, "order": 1000, "attributes": {"dtype": "CDROM", "path": "/mnt/tank/iso/debian.iso"}}]),
            )))
        });

        let state = VmResource::new(Arc::new(mock))
            .create(&OperationContext::background(), planned)
            .await
            .state
            .unwrap();
        assert_eq!(state.id, Attr::Known("1".into()));
        assert_eq!(state.cdrom[0].device_id, Attr::Known("11".into()));
        assert_eq!(state.state, Attr::Known("RUNNING".into()));
    }

    #[tokio::test]
    async fn delete_force_stops_running_vm() {
        let mut mock = MockVmService::new();
        let mut seq = Sequence::new();
        mock.expect_vm_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(serde_json::from_value(json!({"state": "RUNNING"})).unwrap()));
        mock.expect_stop_vm()
            .with(eq(VmId::new(1)), eq(StopOptions::forced()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        mock.expect_delete_vm()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let response = VmResource::new(Arc::new(mock))
            .delete(&OperationContext::background(), base_model())
            .await;
        assert!(!response.has_error());
    }

    #[tokio::test]
    async fn read_missing_vm_is_removed() {
        let mut mock = MockVmService::new();
        mock.expect_get_vm().returning(|_| Ok(None));
        let response = VmResource::new(Arc::new(mock))
            .read(&OperationContext::background(), base_model())
            .await;
        assert_eq!(response.state, Some(ReadOutcome::Removed));
    }

    #[test]
    fn validate_config_flags_bad_devices() {
        let config = VmModel {
            memory: Attr::Known(128),
            shutdown_timeout: Attr::Known(1),
            cdrom: vec![CdromDevice {
                path: Attr::Known("/tmp/x.iso".into()),
                ..CdromDevice::default()
            }],
            display: vec![DisplayDevice {
                port: Attr::Known(80),
                ..DisplayDevice::default()
            }],
            nic: vec![NicDevice {
                mac: Attr::Known("zz:zz".into()),
                ..NicDevice::default()
            }],
            ..base_model()
        };
        let diags = VmResource::new(Arc::new(MockVmService::new())).validate_config(&config);
        let attrs: Vec<_> = diags.errors().filter_map(|d| d.attribute.clone()).collect();
        for expected in ["memory", "shutdown_timeout", "cdrom.0.path", "display.0.port", "nic.0.mac"] {
            assert!(attrs.iter().any(|a| a == expected), "missing {expected} in {attrs:?}");
        }
    }

    #[tokio::test]
    async fn import_rejects_non_numeric_id() {
        let response = VmResource::new(Arc::new(MockVmService::new()))
            .import(&OperationContext::background(), "web")
            .await;
        assert!(response.has_error());
    }
}
