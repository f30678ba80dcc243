//! Values whose equality follows their meaning instead of their bytes.
//!
//! Each wrapper keeps the user's spelling. Two predicates exist: `==` (state
//! identity, used for change detection) and
//! [`SemanticEquality::semantic_equal`] (domain identity, used to suppress
//! no-op diffs). A value that fails to parse is compared byte for byte.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::value::Attr;

/// Domain equality.
pub trait SemanticEquality {
    /// True when both values mean the same thing.
    fn semantic_equal(&self, other: &Self) -> bool;
}

impl<T: SemanticEquality> SemanticEquality for Attr<T> {
    /// Null only matches null; unknown matches nothing.
    fn semantic_equal(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Known(a), Self::Known(b)) => a.semantic_equal(b),
            _ => false,
        }
    }
}

macro_rules! string_value {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            /// Wraps a string verbatim.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// The original spelling.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Unwraps the original spelling.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_value!(
    /// YAML text, equal when both sides parse to the same tree.
    YamlString
);

string_value!(
    /// String compared after case folding.
    CaseInsensitiveString
);

string_value!(
    /// Byte size such as `10G` or `1048576`, SI (1000-based) suffixes.
    SizeString
);

impl YamlString {
    /// Parsed tree, if the text is well-formed.
    #[must_use]
    pub fn parse(&self) -> Option<serde_yaml::Value> {
        serde_yaml::from_str(&self.0).ok()
    }
}

impl SemanticEquality for YamlString {
    fn semantic_equal(&self, other: &Self) -> bool {
        match (self.parse(), other.parse()) {
            (Some(a), Some(b)) => a == b,
            _ => self.0 == other.0,
        }
    }
}

impl CaseInsensitiveString {
    /// Upper-cased form.
    #[must_use]
    pub fn to_upper(&self) -> String {
        self.0.to_uppercase()
    }
}

impl SemanticEquality for CaseInsensitiveString {
    fn semantic_equal(&self, other: &Self) -> bool {
        self.0.to_lowercase() == other.0.to_lowercase()
    }
}

static SIZE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)(?:\.(\d+))?\s*(?:([KMGTkmgt])[Bb]?|[Bb])?\s*$").expect("valid regex")
});

impl SizeString {
    /// Byte count, if the spelling parses.
    #[must_use]
    pub fn bytes(&self) -> Option<u64> {
        parse_size(&self.0)
    }

    /// Spelling for a raw byte count.
    #[must_use]
    pub fn from_bytes(bytes: u64) -> Self {
        Self(bytes.to_string())
    }
}

impl SemanticEquality for SizeString {
    fn semantic_equal(&self, other: &Self) -> bool {
        match (self.bytes(), other.bytes()) {
            (Some(a), Some(b)) => a == b,
            _ => self.0 == other.0,
        }
    }
}

/// Parses `123`, `10G`, `1.5T`, `512 MB` into bytes.
#[must_use]
pub fn parse_size(input: &str) -> Option<u64> {
    let caps = SIZE_PATTERN.captures(input)?;
    let whole: u128 = caps.get(1)?.as_str().parse().ok()?;
    let multiplier: u128 = match caps.get(3).map_or("", |m| m.as_str()).to_ascii_uppercase().as_str() {
        "" => 1,
        "K" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        _ => return None,
    };

    let mut bytes = whole.checked_mul(multiplier)?;
    if let Some(fraction) = caps.get(2) {
        let digits = fraction.as_str();
        let scale = 10u128.checked_pow(u32::try_from(digits.len()).ok()?)?;
        let numerator: u128 = digits.parse().ok()?;
        let part = numerator.checked_mul(multiplier)?;
        if part % scale != 0 {
            return None;
        }
        bytes = bytes.checked_add(part / scale)?;
    }
    u64::try_from(bytes).ok()
}
