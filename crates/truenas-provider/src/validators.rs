//! Configuration validators shared by schemas and `validate_config`.
//!
//! Validators run before any side effect and report through
//! [`Diagnostics`] with the offending attribute path.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::framework::{Attr, Diagnostics};

const INVALID_VALUE: &str = "Invalid Attribute Value";

static MAC_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("valid regex"));

/// Attribute-level validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "args", rename_all = "snake_case")]
pub enum Validator {
    /// Value must be one of `values`
    OneOf {
        /// Accepted values
        values: &'static [&'static str],
        /// Compare after case folding
        case_insensitive: bool,
    },
    /// Integer within `[min, max]`
    IntRange {
        /// Lower bound
        min: i64,
        /// Upper bound
        max: i64,
    },
    /// Integer at least `min`
    AtLeast(i64),
    /// Absolute path without `..` components
    AbsolutePath,
    /// Path starting with the prefix
    PathPrefix(&'static str),
    /// Colon separated MAC address
    MacAddress,
    /// Non-empty string
    NonEmpty,
}

impl Validator {
    /// Case-sensitive one-of.
    #[must_use]
    pub const fn one_of(values: &'static [&'static str]) -> Self {
        Self::OneOf {
            values,
            case_insensitive: false,
        }
    }

    /// Case-insensitive one-of.
    #[must_use]
    pub const fn one_of_ignore_case(values: &'static [&'static str]) -> Self {
        Self::OneOf {
            values,
            case_insensitive: true,
        }
    }

    /// Check a string value. Returns the failure detail.
    #[must_use]
    pub fn check_str(&self, value: &str) -> Option<String> {
        match self {
            Self::OneOf {
                values,
                case_insensitive,
            } => {
                let found = values.iter().any(|candidate| {
                    if *case_insensitive {
                        candidate.eq_ignore_ascii_case(value)
                    } else {
                        *candidate == value
                    }
                });
                (!found).then(|| format!("value must be one of {values:?}, got \"{value}\""))
            }
            Self::AbsolutePath => {
                if !value.starts_with('/') {
                    Some(format!("path must be absolute, got \"{value}\""))
                } else if value.split('/').any(|part| part == "..") {
                    Some(format!("path must not contain '..' components, got \"{value}\""))
                } else {
                    None
                }
            }
            Self::PathPrefix(prefix) => (!value.starts_with(prefix))
                .then(|| format!("path must begin with {prefix}, got \"{value}\"")),
            Self::MacAddress => (!MAC_ADDRESS.is_match(value))
                .then(|| format!("value must be a MAC address like 00:a0:98:12:34:56, got \"{value}\"")),
            Self::NonEmpty => value
                .trim()
                .is_empty()
                .then(|| "value must not be empty".to_string()),
            Self::IntRange { .. } | Self::AtLeast(_) => None,
        }
    }

    /// Check an integer value. Returns the failure detail.
    #[must_use]
    pub fn check_int(&self, value: i64) -> Option<String> {
        match self {
            Self::IntRange { min, max } => (value < *min || value > *max)
                .then(|| format!("value must be between {min} and {max}, got {value}")),
            Self::AtLeast(min) => {
                (value < *min).then(|| format!("value must be at least {min}, got {value}"))
            }
            _ => None,
        }
    }
}

/// Runs string validators on a known value.
pub fn validate_str<S: AsRef<str>>(
    diags: &mut Diagnostics,
    path: &str,
    value: &Attr<S>,
    validators: &[Validator],
) {
    if let Some(value) = value.get() {
        for validator in validators {
            if let Some(detail) = validator.check_str(value.as_ref()) {
                diags.add_attribute_error(path, INVALID_VALUE, detail);
            }
        }
    }
}

/// Runs integer validators on a known value.
pub fn validate_int(diags: &mut Diagnostics, path: &str, value: &Attr<i64>, validators: &[Validator]) {
    if let Some(value) = value.get() {
        for validator in validators {
            if let Some(detail) = validator.check_int(*value) {
                diags.add_attribute_error(path, INVALID_VALUE, detail);
            }
        }
    }
}

/// Reports a missing required attribute.
pub fn require<T>(diags: &mut Diagnostics, path: &str, value: &Attr<T>) {
    if value.is_null() {
        diags.add_attribute_error(
            path,
            "Missing Required Attribute",
            format!("{path} is required"),
        );
    }
}

/// `mode` must accompany an explicit owner.
pub fn mode_requires_owner(
    diags: &mut Diagnostics,
    mode: &Attr<String>,
    uid: &Attr<i64>,
    gid: &Attr<i64>,
) {
    if mode.is_null() && (uid.is_known() || gid.is_known()) {
        diags.add_attribute_error(
            "mode",
            "Missing Attribute Configuration",
            "mode is required when uid or gid is set",
        );
    }
}
