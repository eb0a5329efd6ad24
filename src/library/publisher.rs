//! Publisher model.

use std::fmt;

/// Publisher name used when the source gives nothing usable.
pub const UNKNOWN_PUBLISHER: &str = "N/A";

/// A publisher, identified by its trimmed name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Publisher {
    name: String,
}

impl Publisher {
    /// Create a publisher. Empty or whitespace-only names become "N/A".
    pub fn new(name: &str) -> Self {
        Self::from_optional(Some(name))
    }

    /// Create a publisher from a possibly missing name.
    pub fn from_optional(name: Option<&str>) -> Self {
        let name = name
            .and_then(super::non_empty_trimmed)
            .unwrap_or(UNKNOWN_PUBLISHER)
            .to_string();
        Self { name }
    }

    /// Publisher name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the publisher, with the same normalization as [`Publisher::new`].
    pub fn set_name(&mut self, name: &str) {
        *self = Self::new(name);
    }
}

impl fmt::Display for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Publisher {}>", self.name)
    }
}
