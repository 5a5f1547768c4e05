//! Tasks and the resource contract.
//!
//! A task is one named resource description in a run. Each resource kind
//! implements [`Resource`]; the engine erases the kind behind an internal trait
//! so a single [`TaskSet`] can hold many kinds at once.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use converge_core::{Field, Lifecycle, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::Adapters;
use crate::changes::{ChangeSet, Differ};
use crate::reconciler::{Reconciled, Reconciler};

/// Unique task name within a run.
pub type TaskName = String;

/// Reference from one task to another by name.
///
/// The referenced task's provider identifier is filled in once it converges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskRef(TaskName);

impl TaskRef {
    pub fn new(name: impl Into<TaskName>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Provider identifiers of tasks that already converged.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    ids: HashMap<TaskName, String>,
}

impl Resolved {
    pub fn insert(&mut self, task: impl Into<TaskName>, id: impl Into<String>) {
        self.ids.insert(task.into(), id.into());
    }

    /// Identifier of the referenced task, if it converged with one.
    #[must_use]
    pub fn id_of(&self, task: &TaskRef) -> Option<&str> {
        self.ids.get(task.name()).map(String::as_str)
    }

    /// Resolve a reference into a derived field.
    ///
    /// A reference that has not converged leaves the field as it is.
    ///
    /// # Errors
    ///
    /// Returns `CannotChangeField` naming `field` if it already holds a
    /// different identifier.
    pub fn fill(&self, link: Option<&TaskRef>, field: &str, target: &mut Field<String>) -> Result<()> {
        match link.and_then(|link| self.id_of(link)) {
            Some(id) => target.absorb(field, &Field::Set(id.to_string())),
            None => Ok(()),
        }
    }
}

/// Name and kind of every task in a run, for kind-based dependency lookups.
#[derive(Debug, Clone, Default)]
pub struct TaskIndex {
    kinds: BTreeMap<TaskName, &'static str>,
}

impl TaskIndex {
    /// Names of all tasks of the given kind, sorted.
    #[must_use]
    pub fn of_kind<R: Resource>(&self) -> Vec<TaskName> {
        self.kinds
            .iter()
            .filter(|(_, kind)| **kind == R::KIND)
            .map(|(name, _)| name.clone())
            .collect()
    }

    #[must_use]
    pub fn kind_of(&self, task: &str) -> Option<&'static str> {
        self.kinds.get(task).copied()
    }

    #[must_use]
    pub fn contains(&self, task: &str) -> bool {
        self.kinds.contains_key(task)
    }
}

/// Contract every resource kind implements.
///
/// Resource values are used three ways: as the expected state from the
/// manifest, as the actual state returned by `find`, and as the delta produced
/// by `diff` (unchanged fields left `Unset`).
#[async_trait]
pub trait Resource: Clone + Default + fmt::Debug + Send + Sync + 'static {
    /// Provider capability this kind talks to.
    type Adapter: ?Sized + Send + Sync + 'static;

    /// Kind name used in manifests and logs.
    const KIND: &'static str;

    fn lifecycle(&self) -> Lifecycle;

    /// Provider-assigned identifier.
    fn id(&self) -> &Field<String>;

    /// Names of tasks that must converge before this one.
    fn dependencies(&self, _index: &TaskIndex) -> Vec<TaskName> {
        Vec::new()
    }

    /// Fill derived fields from converged dependencies.
    ///
    /// # Errors
    ///
    /// Returns an error if a derived field conflicts with an assigned one.
    fn resolve(&mut self, _resolved: &Resolved) -> Result<()> {
        Ok(())
    }

    /// Look up the actual object. `Ok(None)` means it does not exist.
    async fn find(&self, adapter: &Self::Adapter) -> Result<Option<Self>>;

    /// Compare field by field, returning the delta.
    fn diff(actual: &Self, expected: &Self, differ: &mut Differ) -> Self;

    /// Validate the change set before anything is applied.
    ///
    /// # Errors
    ///
    /// Returns `RequiredField` or `CannotChangeField`.
    fn check_changes(actual: Option<&Self>, expected: &Self, changes: &ChangeSet<Self>)
    -> Result<()>;

    /// Create the object, returning what the provider reports.
    async fn create(&self, adapter: &Self::Adapter) -> Result<Self>;

    /// Apply the delta (`self`) to the object with identifier `id`.
    async fn update(&self, id: &str, adapter: &Self::Adapter) -> Result<Self>;

    /// Copy provider-assigned values from an observed object.
    ///
    /// # Errors
    ///
    /// Returns `CannotChangeField` if an assigned value would change.
    fn absorb(&mut self, observed: &Self) -> Result<()>;
}

/// Kind-erased task held by a [`TaskSet`].
#[async_trait]
pub(crate) trait DynTask: fmt::Debug + Send + Sync {
    fn kind(&self) -> &'static str;
    fn dependencies(&self, index: &TaskIndex) -> Vec<TaskName>;
    fn id(&self) -> Option<String>;
    fn as_any(&self) -> &dyn Any;
    async fn reconcile(
        &mut self,
        reconciler: &Reconciler,
        adapters: &Adapters,
        resolved: &Resolved,
    ) -> Result<Reconciled>;
}

#[derive(Debug)]
struct Slot<R>(R);

#[async_trait]
impl<R: Resource> DynTask for Slot<R> {
    fn kind(&self) -> &'static str {
        R::KIND
    }

    fn dependencies(&self, index: &TaskIndex) -> Vec<TaskName> {
        self.0.dependencies(index)
    }

    fn id(&self) -> Option<String> {
        self.0.id().value().cloned()
    }

    fn as_any(&self) -> &dyn Any {
        &self.0
    }

    async fn reconcile(
        &mut self,
        reconciler: &Reconciler,
        adapters: &Adapters,
        resolved: &Resolved,
    ) -> Result<Reconciled> {
        let adapter = adapters.require::<R>()?;
        reconciler
            .reconcile(&mut self.0, &*adapter, resolved)
            .await
    }
}

/// Named tasks of any kinds, keyed and iterated by name.
#[derive(Debug, Default)]
pub struct TaskSet {
    tasks: BTreeMap<TaskName, Box<dyn DynTask>>,
}

impl TaskSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task. A task with the same name is replaced.
    pub fn insert<R: Resource>(&mut self, name: impl Into<TaskName>, resource: R) -> &mut Self {
        self.tasks.insert(name.into(), Box::new(Slot(resource)));
        self
    }

    /// Builder form of [`TaskSet::insert`].
    #[must_use]
    pub fn with<R: Resource>(mut self, name: impl Into<TaskName>, resource: R) -> Self {
        self.insert(name, resource);
        self
    }

    /// The task's current value, if it exists and has kind `R`.
    #[must_use]
    pub fn get<R: Resource>(&self, name: &str) -> Option<&R> {
        self.tasks.get(name)?.as_any().downcast_ref::<R>()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// The task's identifier, whatever its kind.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<String> {
        self.tasks.get(name)?.id()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &TaskName> {
        self.tasks.keys()
    }

    #[must_use]
    pub fn index(&self) -> TaskIndex {
        TaskIndex {
            kinds: self
                .tasks
                .iter()
                .map(|(name, task)| (name.clone(), task.kind()))
                .collect(),
        }
    }

    /// Declared dependencies of every task, resolved against this set.
    #[must_use]
    pub fn dependency_lists(&self) -> Vec<(TaskName, Vec<TaskName>)> {
        let index = self.index();
        self.tasks
            .iter()
            .map(|(name, task)| (name.clone(), task.dependencies(&index)))
            .collect()
    }

    pub(crate) fn take(&mut self, name: &str) -> Option<Box<dyn DynTask>> {
        self.tasks.remove(name)
    }

    pub(crate) fn restore(&mut self, name: TaskName, task: Box<dyn DynTask>) {
        self.tasks.insert(name, task);
    }
}
