//! Integration tests for parsing middleware query results.
//!
//! These tests validate that the truenas-api models deserialize real
//! `vm.query` output, including device classes in their wire shape.

use std::fs;
use std::path::PathBuf;
use truenas_api::models::Vm;
use truenas_core::ids::{DeviceId, VmId};

/// Get the path to the test fixtures directory.
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Load the VM query fixture from disk.
fn load_vm_query_fixture() -> String {
    let fixture_path = fixtures_dir().join("vm_query.json");
    fs::read_to_string(&fixture_path).unwrap_or_else(|e| {
        panic!(
            "Failed to read VM query fixture at {}: {}",
            fixture_path.display(),
            e
        )
    })
}

#[test]
fn test_deserialize_vm_query() {
    let json_data = load_vm_query_fixture();

    let vms: Vec<Vm> = serde_json::from_str(&json_data)
        .unwrap_or_else(|e| panic!("Failed to deserialize VM query data: {e}"));

    assert_eq!(vms.len(), 1, "Expected 1 VM in test data");
    let vm = &vms[0];
    assert_eq!(vm.id, VmId::new(3));
    assert_eq!(vm.cpu_mode, "HOST-PASSTHROUGH");
    assert_eq!(vm.min_memory, Some(4096));
    assert!(vm.status.is_running());
}

#[test]
fn test_vm_devices_by_class() {
    let vms: Vec<Vm> = serde_json::from_str(&load_vm_query_fixture()).unwrap();
    let devices = &vms[0].devices;

    let classes: Vec<_> = devices.iter().filter_map(|d| d.dtype()).collect();
    assert_eq!(classes, vec!["DISK", "RAW", "CDROM", "NIC", "DISPLAY"]);

    let raw = devices
        .iter()
        .find(|d| d.dtype() == Some("RAW"))
        .expect("Should have a RAW device");
    assert_eq!(raw.id, DeviceId::new(8));
    assert_eq!(raw.int_attr("size"), Some(10_737_418_240));
    // create-only flag is never echoed back
    assert!(raw.attributes.get("exists").is_none());

    let display = devices
        .iter()
        .find(|d| d.dtype() == Some("DISPLAY"))
        .expect("Should have a DISPLAY device");
    assert_eq!(display.int_attr("port"), Some(5900));
    assert_eq!(display.bool_attr("web"), Some(true));
}
