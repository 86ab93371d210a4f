//! Report schema versioning.

use core::fmt;

use crate::SCHEMA_VERSION;

/// Schema version embedded in every [`HealthReport`](crate::HealthReport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchemaVersion {
    /// Breaking changes increment this.
    pub major: u32,
    /// Additive changes increment this.
    pub minor: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// The schema version written by this library.
    pub const fn current() -> Self {
        Self::new(SCHEMA_VERSION, 0)
    }

    /// A report is readable when its major version matches ours.
    pub fn is_compatible(&self) -> bool {
        self.major == SCHEMA_VERSION
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_bumps_stay_compatible() {
        assert!(SchemaVersion::new(SCHEMA_VERSION, 7).is_compatible());
        assert!(!SchemaVersion::new(SCHEMA_VERSION + 1, 0).is_compatible());
    }

    #[test]
    fn display() {
        assert_eq!(SchemaVersion::new(1, 2).to_string(), "v1.2");
    }
}
