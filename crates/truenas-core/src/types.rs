//! API method families.
//!
//! TrueNAS middleware methods are namespaced (`app.create`, `vm.device.update`,
//! ...). Only the snapshot namespace moved between releases; every other
//! family resolves to `<family>.<op>` on all supported versions.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::version::Version;

/// First release that serves snapshots from `pool.snapshot`.
pub const POOL_SNAPSHOT_SINCE: (u32, u32) = (25, 10);

/// Middleware method namespaces used by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiFamily {
    /// Applications
    App,
    /// Datasets
    Dataset,
    /// ZFS snapshots (version dependent)
    Snapshot,
    /// Virtual machines
    Vm,
    /// Virtual machine devices
    VmDevice,
    /// Filesystem helpers
    Filesystem,
    /// Cron jobs
    Cron,
    /// Virtualization global config
    Virt,
    /// Cloud sync credentials
    CloudSync,
    /// Job queue and core helpers
    Core,
    /// System information
    System,
}

impl ApiFamily {
    /// Returns the namespace as used in method names.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Dataset => "pool.dataset",
            Self::Snapshot => "snapshot",
            Self::Vm => "vm",
            Self::VmDevice => "vm.device",
            Self::Filesystem => "filesystem",
            Self::Cron => "cronjob",
            Self::Virt => "virt.global",
            Self::CloudSync => "cloudsync.credentials",
            Self::Core => "core",
            Self::System => "system",
        }
    }

    /// Returns all families.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::App,
            Self::Dataset,
            Self::Snapshot,
            Self::Vm,
            Self::VmDevice,
            Self::Filesystem,
            Self::Cron,
            Self::Virt,
            Self::CloudSync,
            Self::Core,
            Self::System,
        ]
    }

    /// Returns true if the method prefix depends on the server version.
    #[must_use]
    pub const fn is_versioned(&self) -> bool {
        matches!(self, Self::Snapshot)
    }

    /// Resolves the fully-qualified method name for `op` on `version`.
    #[must_use]
    pub fn method(&self, version: &Version, op: &str) -> String {
        match self {
            Self::Snapshot => {
                let (major, minor) = POOL_SNAPSHOT_SINCE;
                if version.at_least(major, minor) {
                    format!("pool.snapshot.{op}")
                } else {
                    format!("zfs.snapshot.{op}")
                }
            }
            other => format!("{}.{op}", other.name()),
        }
    }
}

impl FromStr for ApiFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|family| family.name() == lowered)
            .or(match lowered.as_str() {
                "dataset" => Some(Self::Dataset),
                "cron" => Some(Self::Cron),
                "virt" => Some(Self::Virt),
                "cloudsync" => Some(Self::CloudSync),
                _ => None,
            })
            .ok_or_else(|| Error::ValidationError(format!("Unknown API family: {s}")))
    }
}

impl std::fmt::Display for ApiFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Resolves a version-qualified method name from a family string.
///
/// Unknown families resolve to the bare `<family>.<op>` form, which is what
/// every version-independent namespace looks like.
#[must_use]
pub fn resolve_method(version: &Version, family: &str, op: &str) -> String {
    family.parse::<ApiFamily>().map_or_else(
        |_| format!("{family}.{op}"),
        |family| family.method(version, op),
    )
}
