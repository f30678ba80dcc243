//! `truenas_vm`: virtual machines with differential device synchronisation.
//!
//! Scalars are updated only when one of them changed. Devices are diffed
//! per class by server id: stale devices are deleted across all classes
//! first, then each class creates and updates in turn. The power state is
//! applied last.

pub mod devices;
pub mod mapping;
pub mod model;
pub mod reconcile;

pub use devices::{
    CdromDevice, ClassDiff, DeviceBlock, DiskDevice, DisplayDevice, NicDevice, PciDevice,
    RawDevice, UsbDevice,
};
pub use model::VmModel;
pub use reconcile::VmResource;
