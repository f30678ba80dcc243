//! Attribute values as the host sees them.

/// A planned or stored attribute.
///
/// `Unknown` only appears in plans, for values computed during apply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Attr<T> {
    /// Not set
    #[default]
    Null,
    /// Known only after apply
    Unknown,
    /// Set
    Known(T),
}

impl<T> Attr<T> {
    /// Wraps a value.
    pub const fn known(value: T) -> Self {
        Self::Known(value)
    }

    /// True for `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for `Unknown`.
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// True for `Known`.
    pub const fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Borrow the value if known.
    pub const fn get(&self) -> Option<&T> {
        match self {
            Self::Known(value) => Some(value),
            _ => None,
        }
    }

    /// Take the value if known.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Known(value) => Some(value),
            _ => None,
        }
    }

    /// Borrowing view.
    pub const fn as_ref(&self) -> Attr<&T> {
        match self {
            Self::Null => Attr::Null,
            Self::Unknown => Attr::Unknown,
            Self::Known(value) => Attr::Known(value),
        }
    }

    /// Maps a known value, keeping null/unknown.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Attr<U> {
        match self {
            Self::Null => Attr::Null,
            Self::Unknown => Attr::Unknown,
            Self::Known(value) => Attr::Known(f(value)),
        }
    }

    /// Replaces null or unknown with `default`.
    #[must_use]
    pub fn or_known(self, default: T) -> Self {
        match self {
            Self::Known(value) => Self::Known(value),
            _ => Self::Known(default),
        }
    }

    /// Replaces only null with `default`; unknown stays unknown.
    #[must_use]
    pub fn or_default_if_null(self, default: T) -> Self {
        match self {
            Self::Null => Self::Known(default),
            other => other,
        }
    }
}

impl<T: Clone> Attr<T> {
    /// Known value or `default`.
    pub fn get_or(&self, default: T) -> T {
        self.get().cloned().unwrap_or(default)
    }
}

impl<T> From<Option<T>> for Attr<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Self::Known)
    }
}

impl From<&str> for Attr<String> {
    fn from(value: &str) -> Self {
        Self::Known(value.to_string())
    }
}
