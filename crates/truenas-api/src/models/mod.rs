//! Middleware payloads shared by the services.

pub mod app;
pub mod job;
pub mod query;
pub mod snapshot;
pub mod vm;

pub use app::{App, AppCreateRequest, AppUpdateRequest};
pub use job::{Job, JobProgress, JobState};
pub use query::QueryFilter;
pub use snapshot::{Snapshot, SnapshotCreateRequest};
pub use vm::{DeviceRequest, StopOptions, Vm, VmDevice, VmRequest, VmStatus};
