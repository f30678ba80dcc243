//! Typed facade over the TrueNAS SCALE middleware API.
//!
//! The facade turns middleware RPCs into typed, blocking-from-the-caller's
//! view operations: method names are resolved against the server version,
//! long-running jobs are tracked until they finish, and every failure comes
//! back as a classified [`truenas_core::ApiError`].

#![deny(missing_docs)]

pub mod client;
pub mod jobs;
pub mod models;
pub mod services;
pub mod transport;

pub use client::TrueNasClient;
pub use jobs::JobTracker;
pub use services::{AppService, SnapshotService, SystemService, VmService};
pub use transport::{HttpTransport, HttpTransportBuilder, Transport};

#[cfg(any(test, feature = "mock"))]
pub use services::{MockAppService, MockSnapshotService, MockSystemService, MockVmService};
#[cfg(any(test, feature = "mock"))]
pub use transport::MockTransport;

/// Convenient result alias that reuses the shared TrueNAS error type.
pub type Result<T> = truenas_core::Result<T>;
