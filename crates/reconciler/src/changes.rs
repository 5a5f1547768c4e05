//! Change Set computation.
//!
//! A [`ChangeSet`] is the per-field delta between the actual resource observed
//! at the provider and the expected (desired) one. The delta is a value of the
//! resource type itself in which every unchanged field is `Unset`, so an update
//! call can carry only what changed.

use std::fmt;

use converge_core::Field;
use itertools::Itertools;

use crate::task::Resource;

/// How a single field differs between actual and expected state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Expected sets a value the actual object does not have.
    NewlySet,
    /// Expected sets a value different from the actual one.
    Modified,
    /// Expected clears a value the actual object has.
    Cleared,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewlySet => write!(f, "set"),
            Self::Modified => write!(f, "modified"),
            Self::Cleared => write!(f, "cleared"),
        }
    }
}

/// One changed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    /// Field name as reported in errors (`"ID"`, `"Name"`, ...).
    pub field: &'static str,
    pub kind: ChangeKind,
    /// Rendered actual value.
    pub from: String,
    /// Rendered expected value.
    pub to: String,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {} -> {}", self.field, self.kind, self.from, self.to)
    }
}

/// Classify one field. `None` means unchanged.
pub fn classify<T: PartialEq>(actual: &Field<T>, expected: &Field<T>) -> Option<ChangeKind> {
    match (actual, expected) {
        (_, Field::Unset) => None,
        (Field::Set(a), Field::Set(e)) if a == e => None,
        (Field::Set(_), Field::Set(_)) => Some(ChangeKind::Modified),
        (Field::Unset | Field::Cleared, Field::Set(_)) => Some(ChangeKind::NewlySet),
        (Field::Set(_), Field::Cleared) => Some(ChangeKind::Cleared),
        (Field::Unset | Field::Cleared, Field::Cleared) => None,
    }
}

fn render<T: fmt::Debug>(field: &Field<T>) -> String {
    match field {
        Field::Unset => "<unset>".to_string(),
        Field::Cleared => "<cleared>".to_string(),
        Field::Set(value) => format!("{value:?}"),
    }
}

/// Field-by-field comparison helper handed to [`Resource::diff`].
#[derive(Debug, Default)]
pub struct Differ {
    entries: Vec<FieldChange>,
}

impl Differ {
    /// Create an empty differ.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare one field, record the classification, and return the delta value.
    pub fn field<T>(&mut self, name: &'static str, actual: &Field<T>, expected: &Field<T>) -> Field<T>
    where
        T: Clone + PartialEq + fmt::Debug,
    {
        match classify(actual, expected) {
            None => Field::Unset,
            Some(kind) => {
                self.entries.push(FieldChange {
                    field: name,
                    kind,
                    from: render(actual),
                    to: render(expected),
                });
                expected.clone()
            }
        }
    }

    /// The recorded changes, in comparison order.
    #[must_use]
    pub fn finish(self) -> Vec<FieldChange> {
        self.entries
    }
}

/// The computed delta between actual and expected state of one task.
#[derive(Debug, Clone)]
pub struct ChangeSet<R> {
    delta: R,
    entries: Vec<FieldChange>,
}

impl<R: Resource> ChangeSet<R> {
    /// Diff `expected` against `actual`; an absent actual diffs against a blank resource.
    pub fn compute(actual: Option<&R>, expected: &R) -> Self {
        let blank = R::default();
        let mut differ = Differ::new();
        let delta = R::diff(actual.unwrap_or(&blank), expected, &mut differ);
        Self {
            delta,
            entries: differ.finish(),
        }
    }
}

impl<R> ChangeSet<R> {
    /// Whether no field changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of changed fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the named field changed.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.entries.iter().any(|entry| entry.field == field)
    }

    /// The typed delta: unchanged fields are `Unset`.
    pub const fn delta(&self) -> &R {
        &self.delta
    }

    /// The per-field classifications.
    #[must_use]
    pub fn entries(&self) -> &[FieldChange] {
        &self.entries
    }

    /// Names of the changed fields.
    #[must_use]
    pub fn fields(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.field).collect()
    }

    /// Names of the changed fields, comma separated.
    #[must_use]
    pub fn field_names(&self) -> String {
        self.entries.iter().map(|entry| entry.field).join(", ")
    }

    pub fn into_entries(self) -> Vec<FieldChange> {
        self.entries
    }
}
