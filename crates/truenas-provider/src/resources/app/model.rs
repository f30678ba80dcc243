//! App resource model.

use std::collections::BTreeMap;

use crate::framework::{Attr, CaseInsensitiveString, YamlString};

/// Default bound for reaching a stable state, in seconds.
pub const DEFAULT_STATE_TIMEOUT: i64 = truenas_core::client::DEFAULT_STATE_TIMEOUT as i64;

/// Config, plan and state of a `truenas_app`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppModel {
    /// Same as the name
    pub id: Attr<String>,
    /// App name; changing it replaces the app
    pub name: Attr<String>,
    /// Deployed from a custom compose file
    pub custom_app: Attr<bool>,
    /// Compose YAML, compared semantically
    pub compose_config: Attr<YamlString>,
    /// `running` or `stopped`, any case; stored as written
    pub desired_state: Attr<CaseInsensitiveString>,
    /// Seconds to wait for a stable state
    pub state_timeout: Attr<i64>,
    /// Changing any value restarts a running app
    pub restart_triggers: Attr<BTreeMap<String, String>>,
    /// Observed lifecycle state
    pub state: Attr<String>,
}

impl AppModel {
    /// Model for `name` with everything else unset.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Attr::Known(name.into()),
            ..Self::default()
        }
    }

    /// The name, empty if unset.
    #[must_use]
    pub fn name_str(&self) -> &str {
        self.name.get().map_or("", String::as_str)
    }

    /// The wait bound, falling back to the default.
    #[must_use]
    pub fn timeout_secs(&self) -> u64 {
        u64::try_from(self.state_timeout.get_or(DEFAULT_STATE_TIMEOUT)).unwrap_or_default()
    }
}
