//! Server records to model.

use std::collections::HashSet;

use truenas_api::models::{Vm, VmDevice};
use truenas_core::ids::DeviceId;

use super::devices::DeviceBlock;
use super::model::VmModel;
use crate::framework::Attr;

/// Map the server's devices of class `D`, keeping the order of `prior`.
///
/// Prior devices are matched by id. Server devices the prior list does not
/// know fill id-less prior entries positionally, the rest are appended by
/// their `order`. Prior devices missing on the server are dropped.
pub fn map_devices<D: DeviceBlock>(server: &[VmDevice], prior: &[D]) -> Vec<D> {
    let of_class: Vec<&VmDevice> = server
        .iter()
        .filter(|device| device.dtype().is_some_and(|dtype| dtype.eq_ignore_ascii_case(D::DTYPE)))
        .collect();
    let prior_ids: HashSet<DeviceId> = prior.iter().filter_map(DeviceBlock::id).collect();

    let mut unmatched: Vec<&VmDevice> = of_class
        .iter()
        .copied()
        .filter(|device| !prior_ids.contains(&device.id))
        .collect();
    unmatched.sort_by_key(|device| (device.order.unwrap_or(i64::MAX), device.id));
    let mut unmatched = unmatched.into_iter();

    let mut mapped = Vec::with_capacity(of_class.len());
    for entry in prior {
        match entry.id() {
            Some(id) => {
                if let Some(device) = of_class.iter().find(|device| device.id == id) {
                    mapped.push(D::from_server(device, Some(entry)));
                }
            }
            None => {
                if let Some(device) = unmatched.next() {
                    mapped.push(D::from_server(device, Some(entry)));
                }
            }
        }
    }
    mapped.extend(unmatched.map(|device| D::from_server(device, None)));
    mapped
}

/// Map a VM record. Device lists follow `prior`.
#[must_use]
pub fn vm_from_server(vm: &Vm, prior: &VmModel) -> VmModel {
    let state = if vm.status.is_running() { "RUNNING" } else { "STOPPED" };
    VmModel {
        id: Attr::Known(vm.id.to_string()),
        name: Attr::Known(vm.name.clone()),
        description: Attr::Known(vm.description.clone()),
        vcpus: Attr::Known(vm.vcpus),
        cores: Attr::Known(vm.cores),
        threads: Attr::Known(vm.threads),
        memory: Attr::Known(vm.memory),
        min_memory: vm.min_memory.into(),
        autostart: Attr::Known(vm.autostart),
        time: Attr::Known(vm.time.clone()),
        bootloader: Attr::Known(vm.bootloader.clone()),
        cpu_mode: Attr::Known(vm.cpu_mode.clone()),
        cpu_model: vm.cpu_model.clone().filter(|model| !model.is_empty()).into(),
        shutdown_timeout: Attr::Known(vm.shutdown_timeout),
        state: Attr::Known(state.to_string()),
        disk: map_devices(&vm.devices, &prior.disk),
        raw: map_devices(&vm.devices, &prior.raw),
        cdrom: map_devices(&vm.devices, &prior.cdrom),
        nic: map_devices(&vm.devices, &prior.nic),
        display: map_devices(&vm.devices, &prior.display),
        pci: map_devices(&vm.devices, &prior.pci),
        usb: map_devices(&vm.devices, &prior.usb),
    }
}
