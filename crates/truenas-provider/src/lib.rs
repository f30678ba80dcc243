//! Declarative reconcilers for TrueNAS SCALE.
//!
//! This crate is the host-facing half of the provider. Each resource exposes
//! a schema, pure plan modification and the usual create/read/update/delete/
//! import operations; all side effects go through the `truenas-api` service
//! traits.
//!
//! # Resources
//!
//! - [`resources::app::AppResource`]: custom applications with lifecycle
//!   state, drift correction and restart triggers
//! - [`resources::vm::VmResource`]: virtual machines with differential
//!   device synchronisation
//! - [`resources::snapshot::SnapshotResource`]: ZFS snapshots
//!
//! # Example
//!
//! ```no_run
//! use truenas_core::config::ProviderConfig;
//! use truenas_provider::framework::{OperationContext, Resource};
//! use truenas_provider::TrueNasProvider;
//!
//! # async fn example() -> truenas_core::Result<()> {
//! let config = ProviderConfig::from_env()?;
//! let provider = TrueNasProvider::new(config)?;
//! let apps = provider.app_resource();
//! let (ctx, _cancel) = OperationContext::new();
//! let imported = apps.import(&ctx, "plex").await;
//! assert!(!imported.diagnostics.has_error());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod framework;
pub mod provider;
pub mod resources;
pub mod validators;

pub use provider::TrueNasProvider;
