//! Strongly-typed identifiers for TrueNAS objects.
//!
//! The middleware hands out plain integers for VMs, VM devices and jobs. The
//! wrappers keep them apart at compile time; on the wire and in provider
//! state they are the bare number (rendered as a string in state).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Macro to generate strongly-typed integer id wrappers.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $doc:expr) => {
        $(#[$meta])*
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw server id.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw server id.
            #[must_use]
            pub const fn get(&self) -> i64 {
                self.0
            }

            /// Parses an id from its string rendering.
            ///
            /// # Errors
            ///
            /// Returns an error if the string is not an integer.
            pub fn parse_str(input: &str) -> Result<Self> {
                input
                    .trim()
                    .parse::<i64>()
                    .map(Self)
                    .map_err(|_| {
                        Error::ValidationError(format!(
                            "invalid {}: `{input}`",
                            stringify!($name)
                        ))
                    })
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(wrapper: $name) -> Self {
                wrapper.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse_str(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(VmId, "Virtual machine id");
numeric_id!(DeviceId, "Virtual machine device id");
numeric_id!(JobId, "Middleware job id");
