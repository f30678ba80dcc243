//! Application payloads (`app.*`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Application record as returned by `app.query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    /// Application name
    pub name: String,
    /// Server id (same as the name on current releases)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Lifecycle state label (`RUNNING`, `STOPPED`, `DEPLOYING`, ...)
    pub state: String,
    /// Whether the app was deployed from a custom compose file
    #[serde(default)]
    pub custom_app: bool,
    /// Installed version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Whether an upgrade is available
    #[serde(default)]
    pub upgrade_available: bool,
    /// Compose map, present when queried with `retrieve_config`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
}

/// Payload for `app.create`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppCreateRequest {
    /// Application name
    pub app_name: String,
    /// Deploy from a custom compose file
    pub custom_app: bool,
    /// Compose YAML
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_compose_config_string: Option<String>,
}

impl AppCreateRequest {
    /// Request for a custom app with an optional compose file.
    #[must_use]
    pub fn new(name: impl Into<String>, custom_app: bool) -> Self {
        Self {
            app_name: name.into(),
            custom_app,
            custom_compose_config_string: None,
        }
    }

    /// Attach compose YAML.
    #[must_use]
    pub fn with_compose(mut self, compose: impl Into<String>) -> Self {
        self.custom_compose_config_string = Some(compose.into());
        self
    }
}

/// Payload for `app.update`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppUpdateRequest {
    /// Replacement compose YAML
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_compose_config_string: Option<String>,
}
