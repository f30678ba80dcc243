//! Per-namespace service traits.
//!
//! The provider only depends on these traits; [`crate::TrueNasClient`]
//! implements all of them and tests substitute mockall doubles.

pub mod app;
pub mod snapshot;
pub mod system;
pub mod vm;

pub use app::AppService;
pub use snapshot::SnapshotService;
pub use system::SystemService;
pub use vm::VmService;

#[cfg(any(test, feature = "mock"))]
pub use app::MockAppService;
#[cfg(any(test, feature = "mock"))]
pub use snapshot::MockSnapshotService;
#[cfg(any(test, feature = "mock"))]
pub use system::MockSystemService;
#[cfg(any(test, feature = "mock"))]
pub use vm::MockVmService;
