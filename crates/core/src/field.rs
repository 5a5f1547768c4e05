//! Three-state optional field values.
//!
//! A desired-state field is either left unset (the caller has no opinion),
//! explicitly cleared, or set to a value. Keeping "unset" and "cleared" apart is
//! what makes required-field checks and per-field diffs correct: an empty list
//! is `Set(vec![])`, not `Unset`.
//!
//! # Serde
//!
//! Combine with `#[serde(default, skip_serializing_if = "Field::is_unset")]`:
//! a missing key is `Unset`, `null` is `Cleared`, anything else is `Set`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A field that may be unset, explicitly cleared, or set to a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field<T> {
    /// No opinion: the field takes no part in diffs or updates.
    Unset,
    /// Explicitly cleared: the field should have no value.
    Cleared,
    /// Set to a concrete value.
    Set(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> Field<T> {
    /// Returns `true` if the field carries a value.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// Returns `true` if the field was never given a value or a clear.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Returns `true` if the field was explicitly cleared.
    #[must_use]
    pub const fn is_cleared(&self) -> bool {
        matches!(self, Self::Cleared)
    }

    /// The value, if set.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Unset | Self::Cleared => None,
        }
    }

    /// Borrow the contents.
    #[must_use]
    pub const fn as_ref(&self) -> Field<&T> {
        match self {
            Self::Unset => Field::Unset,
            Self::Cleared => Field::Cleared,
            Self::Set(value) => Field::Set(value),
        }
    }

    /// Map the value, keeping unset and cleared as they are.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Field<U> {
        match self {
            Self::Unset => Field::Unset,
            Self::Cleared => Field::Cleared,
            Self::Set(value) => Field::Set(f(value)),
        }
    }

    /// Provider-side view: `None` becomes `Cleared`, never `Unset`.
    pub fn observed(value: Option<T>) -> Self {
        value.map_or(Self::Cleared, Self::Set)
    }

    /// Consume into an option; unset and cleared both become `None`.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Unset | Self::Cleared => None,
        }
    }

    /// The value, or a [`Error::RequiredField`] naming `field`.
    ///
    /// # Errors
    ///
    /// Returns `RequiredField` when the field is unset or cleared.
    pub fn require(&self, field: &str) -> Result<&T> {
        self.value().ok_or_else(|| Error::required_field(field))
    }
}

impl<T: Clone + PartialEq> Field<T> {
    /// Copy a provider-assigned value into this field.
    ///
    /// An unset or cleared field takes the observed value. A field that already
    /// holds a different value is immutable once assigned.
    ///
    /// # Errors
    ///
    /// Returns `CannotChangeField` when the field holds a value that differs
    /// from the observed one.
    pub fn absorb(&mut self, field: &str, observed: &Self) -> Result<()> {
        if observed.is_unset() {
            return Ok(());
        }
        if let Self::Set(current) = &*self {
            return match observed {
                Self::Set(new) if current != new => Err(Error::cannot_change_field(field)),
                _ => Ok(()),
            };
        }
        *self = observed.clone();
        Ok(())
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Self::Set(value)
    }
}

impl<T: fmt::Display> fmt::Display for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "<unset>"),
            Self::Cleared => write!(f, "<cleared>"),
            Self::Set(value) => write!(f, "{value}"),
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Set(value) => serializer.serialize_some(value),
            Self::Unset | Self::Cleared => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Self::observed)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Doc {
        #[serde(default, skip_serializing_if = "Field::is_unset")]
        name: Field<String>,
        #[serde(default, skip_serializing_if = "Field::is_unset")]
        servers: Field<Vec<String>>,
    }

    #[test]
    fn test_missing_null_and_value_are_distinct() {
        let doc: Doc = serde_json::from_str(r#"{"servers": null}"#).unwrap();
        assert_eq!(doc.name, Field::Unset);
        assert_eq!(doc.servers, Field::Cleared);

        let doc: Doc = serde_json::from_str(r#"{"name": "a", "servers": []}"#).unwrap();
        assert_eq!(doc.name, Field::Set("a".to_string()));
        assert_eq!(doc.servers, Field::Set(vec![]));
    }

    #[test]
    fn test_yaml_null_is_cleared() {
        let doc: Doc = serde_yaml::from_str("name: ~\n").unwrap();
        assert_eq!(doc.name, Field::Cleared);
        assert_eq!(doc.servers, Field::Unset);
    }

    #[test]
    fn test_unset_is_omitted_when_serialized() {
        let doc = Doc {
            name: Field::Cleared,
            servers: Field::Unset,
        };
        assert_eq!(serde_json::to_string(&doc).unwrap(), r#"{"name":null}"#);
    }

    #[test]
    fn test_require() {
        let name: Field<String> = Field::Unset;
        assert_eq!(name.require("Name"), Err(Error::required_field("Name")));
        let name: Field<String> = Field::Cleared;
        assert!(name.require("Name").is_err());
        let name = Field::Set("api".to_string());
        assert_eq!(name.require("Name").ok(), Some(&"api".to_string()));
    }

    #[test]
    fn test_absorb_fills_unset_field() {
        let mut id: Field<String> = Field::Unset;
        id.absorb("ID", &Field::Set("id-1".to_string())).unwrap();
        assert_eq!(id, Field::Set("id-1".to_string()));
    }

    #[test]
    fn test_absorb_same_value_is_noop() {
        let mut id = Field::Set("id-1".to_string());
        id.absorb("ID", &Field::Set("id-1".to_string())).unwrap();
        assert_eq!(id, Field::Set("id-1".to_string()));
    }

    #[test]
    fn test_absorb_rejects_changing_an_assigned_value() {
        let mut id = Field::Set("id-1".to_string());
        let result = id.absorb("ID", &Field::Set("id-2".to_string()));
        assert_eq!(result, Err(Error::cannot_change_field("ID")));
        assert_eq!(id, Field::Set("id-1".to_string()));
    }

    #[test]
    fn test_absorb_ignores_unset_observation() {
        let mut id = Field::Set("id-1".to_string());
        id.absorb("ID", &Field::Unset).unwrap();
        assert_eq!(id, Field::Set("id-1".to_string()));
    }

    fn any_field<T, S>(value: S) -> impl Strategy<Value = Field<T>>
    where
        T: Clone + fmt::Debug + 'static,
        S: Strategy<Value = T> + 'static,
    {
        prop_oneof![
            Just(Field::Unset),
            Just(Field::Cleared),
            value.prop_map(Field::Set),
        ]
    }

    proptest! {
        #[test]
        fn prop_documents_keep_all_three_states(
            name in any_field("net-[a-z]{0,6}"),
            servers in any_field(proptest::collection::vec("10\\.0\\.0\\.[1-9]", 0..3)),
        ) {
            let doc = Doc { name, servers };

            let json = serde_json::to_string(&doc).unwrap();
            prop_assert_eq!(&serde_json::from_str::<Doc>(&json).unwrap(), &doc);

            let yaml = serde_yaml::to_string(&doc).unwrap();
            prop_assert_eq!(&serde_yaml::from_str::<Doc>(&yaml).unwrap(), &doc);
        }

        #[test]
        fn prop_absorb_never_replaces_an_assigned_value(
            current in any_field(0_u8..4),
            observed in any_field(0_u8..4),
        ) {
            let mut field = current.clone();
            let result = field.absorb("ID", &observed);

            match (&current, &observed) {
                (Field::Set(a), Field::Set(b)) if a != b => {
                    prop_assert_eq!(result, Err(Error::cannot_change_field("ID")));
                    prop_assert_eq!(&field, &current);
                }
                (Field::Set(_), _) | (_, Field::Unset) => {
                    prop_assert!(result.is_ok());
                    prop_assert_eq!(&field, &current);
                }
                _ => {
                    prop_assert!(result.is_ok());
                    prop_assert_eq!(&field, &observed);
                }
            }

            let settled = field.clone();
            if field.absorb("ID", &observed).is_ok() {
                prop_assert_eq!(&field, &settled);
            }
        }
    }
}
