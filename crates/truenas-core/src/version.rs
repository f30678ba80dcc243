//! TrueNAS server version parsing.
//!
//! The middleware reports versions as `TrueNAS-SCALE-24.10.2.4` (up to 24.10)
//! or `TrueNAS-25.04.2.4` (from 25.04 on). Only major/minor matter for API
//! compatibility decisions; patch and build are kept for display and ordering.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"TrueNAS(-SCALE)?-(\d+)\.(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("valid regex")
});

static BARE_VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("valid regex")
});

/// Product flavor encoded in the version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flavor {
    /// `TrueNAS-SCALE-...`
    Scale,
    /// Anything else, including the unified `TrueNAS-...` naming
    Unknown,
}

/// Parsed server version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Major release (e.g. 25)
    pub major: u32,
    /// Minor release (e.g. 10)
    pub minor: u32,
    /// Patch level
    pub patch: u32,
    /// Build number
    pub build: u32,
    /// Product flavor
    pub flavor: Flavor,
    /// Original string, verbatim
    pub raw: String,
}

impl Version {
    /// Parses a version string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] when `raw` is empty or carries no
    /// `major.minor` digit groups.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(Error::InvalidVersion("empty version string".to_string()));
        }

        let (flavor, caps) = if let Some(caps) = VERSION_PATTERN.captures(raw) {
            let flavor = if caps.get(1).is_some() {
                Flavor::Scale
            } else {
                Flavor::Unknown
            };
            (flavor, caps)
        } else if let Some(caps) = BARE_VERSION_PATTERN.captures(raw) {
            (Flavor::Unknown, caps)
        } else {
            return Err(Error::InvalidVersion(format!(
                "no version numbers found in `{raw}`"
            )));
        };

        // Group offsets differ by one between the two patterns.
        let offset = caps.len() - 4;
        let group = |idx: usize| -> Result<u32> {
            caps.get(idx + offset).map_or(Ok(0), |m| {
                m.as_str()
                    .parse()
                    .map_err(|_| Error::InvalidVersion(format!("`{}` in `{raw}`", m.as_str())))
            })
        };

        Ok(Self {
            major: group(0)?,
            minor: group(1)?,
            patch: group(2)?,
            build: group(3)?,
            flavor,
            raw: raw.to_string(),
        })
    }

    /// Returns true if this version is at least `major.minor`.
    /// Patch and build are ignored.
    #[must_use]
    pub const fn at_least(&self, major: u32, minor: u32) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }

    /// Numeric components for ordering.
    #[must_use]
    pub const fn components(&self) -> (u32, u32, u32, u32) {
        (self.major, self.minor, self.patch, self.build)
    }

    /// Three-way comparison over `(major, minor, patch, build)`:
    /// `-1`, `0` or `1`.
    #[must_use]
    pub fn compare(&self, other: &Self) -> i8 {
        match self.components().cmp(&other.components()) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
