//! App lifecycle states.

use std::fmt;

/// Observed app state.
///
/// The server's vocabulary is open-ended; anything that is not one of the
/// three stable labels is transitional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppState {
    /// Running
    Running,
    /// Stopped
    Stopped,
    /// Crashed; holds no runtime resources
    Crashed,
    /// Any other label (`DEPLOYING`, `STOPPING`, ...)
    Transitional(String),
}

impl AppState {
    /// Classify a server label.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "RUNNING" => Self::Running,
            "STOPPED" => Self::Stopped,
            "CRASHED" => Self::Crashed,
            _ => Self::Transitional(label.to_string()),
        }
    }

    /// True for `RUNNING`, `STOPPED` and `CRASHED`.
    #[must_use]
    pub const fn is_stable(&self) -> bool {
        !matches!(self, Self::Transitional(_))
    }

    /// Server spelling.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Crashed => "CRASHED",
            Self::Transitional(label) => label,
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True for `RUNNING`, `STOPPED` and `CRASHED`.
#[must_use]
pub fn is_stable(label: &str) -> bool {
    AppState::parse(label).is_stable()
}

/// Target state of the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    /// Keep the app running
    Running,
    /// Keep the app stopped
    Stopped,
}

impl DesiredState {
    /// Upper-cases `value`; anything but `STOPPED` means `RUNNING`.
    #[must_use]
    pub fn normalize(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("STOPPED") {
            Self::Stopped
        } else {
            Self::Running
        }
    }

    /// Server spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
        }
    }

    /// True when `observed` needs no action. A crashed app counts as stopped.
    #[must_use]
    pub fn satisfied_by(&self, observed: &AppState) -> bool {
        matches!(
            (self, observed),
            (Self::Running, AppState::Running)
                | (Self::Stopped, AppState::Stopped | AppState::Crashed)
        )
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
