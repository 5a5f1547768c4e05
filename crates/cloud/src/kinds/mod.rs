//! Resource kinds.
//!
//! Every kind is looked up by identifier first and by name second, so a task
//! rebuilt from the manifest on the next run finds the object it created.

use std::collections::BTreeMap;

use converge_core::{Error, Field, Result};
use converge_reconciler::ChangeSet;

pub mod load_balancer;
pub mod network;
pub mod subnet;
pub mod volume;

pub use load_balancer::LoadBalancer;
pub use network::Network;
pub use subnet::Subnet;
pub use volume::Volume;

/// Fail with `CannotChangeField` on the first immutable field in `changes`.
pub(crate) fn reject_changes<R>(changes: &ChangeSet<R>, immutable: &[&str]) -> Result<()> {
    match immutable.iter().find(|field| changes.contains(field)) {
        Some(field) => Err(Error::cannot_change_field(*field)),
        None => Ok(()),
    }
}

/// Lists and maps have no null at the provider: cleared means empty.
pub(crate) fn or_empty<T: Clone + Default>(field: &Field<T>) -> Field<T> {
    match field {
        Field::Cleared => Field::Set(T::default()),
        other => other.clone(),
    }
}

/// Scalars with no provider null: cleared carries no opinion.
pub(crate) fn without_null<T: Clone>(field: &Field<T>) -> Field<T> {
    match field {
        Field::Cleared => Field::Unset,
        other => other.clone(),
    }
}

/// An empty tag map carries no opinion.
pub(crate) fn tags_opinion(tags: &Field<BTreeMap<String, String>>) -> Field<BTreeMap<String, String>> {
    match or_empty(tags) {
        Field::Set(tags) if tags.is_empty() => Field::Unset,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleared_list_reads_as_empty() {
        let servers: Field<Vec<String>> = Field::Cleared;
        assert_eq!(or_empty(&servers), Field::Set(Vec::new()));
        assert_eq!(or_empty::<Vec<String>>(&Field::Unset), Field::Unset);
    }

    #[test]
    fn test_cleared_scalar_carries_no_opinion() {
        assert_eq!(without_null::<bool>(&Field::Cleared), Field::Unset);
        assert_eq!(without_null(&Field::Set(false)), Field::Set(false));
        assert_eq!(without_null::<bool>(&Field::Unset), Field::Unset);
    }

    #[test]
    fn test_empty_tags_carry_no_opinion() {
        assert_eq!(tags_opinion(&Field::Cleared), Field::Unset);
        assert_eq!(tags_opinion(&Field::Set(BTreeMap::new())), Field::Unset);

        let tags = BTreeMap::from([("team".to_string(), "core".to_string())]);
        assert_eq!(tags_opinion(&Field::Set(tags.clone())), Field::Set(tags));
    }
}
