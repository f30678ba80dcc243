//! Managed resource types.

pub mod app;
pub mod snapshot;
pub mod vm;
