//! Per-task lifecycle policy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How divergence between desired and actual state is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Create missing objects and correct drift.
    #[default]
    #[serde(alias = "Sync")]
    Sync,
    /// The object must exist and match; any drift is an error.
    #[serde(alias = "ExistsAndValidates")]
    ExistsAndValidates,
    /// The object must exist; drift is logged and left alone.
    #[serde(alias = "ExistsAndWarnIfChanges")]
    ExistsAndWarnIfChanges,
}

impl Lifecycle {
    /// Whether the engine may create or update the object.
    #[must_use]
    pub const fn allows_changes(self) -> bool {
        matches!(self, Self::Sync)
    }

    /// Whether a missing object is an error.
    #[must_use]
    pub const fn requires_existing(self) -> bool {
        !self.allows_changes()
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "Sync"),
            Self::ExistsAndValidates => write!(f, "ExistsAndValidates"),
            Self::ExistsAndWarnIfChanges => write!(f, "ExistsAndWarnIfChanges"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_default_is_sync() {
        assert_eq!(Lifecycle::default(), Lifecycle::Sync);
        assert!(Lifecycle::Sync.allows_changes());
        assert!(Lifecycle::ExistsAndValidates.requires_existing());
        assert!(Lifecycle::ExistsAndWarnIfChanges.requires_existing());
    }

    #[test]
    fn test_accepts_both_spellings() {
        let snake: Lifecycle = serde_json::from_str(r#""exists_and_validates""#).unwrap();
        let pascal: Lifecycle = serde_json::from_str(r#""ExistsAndValidates""#).unwrap();
        assert_eq!(snake, Lifecycle::ExistsAndValidates);
        assert_eq!(pascal, Lifecycle::ExistsAndValidates);
    }
}
