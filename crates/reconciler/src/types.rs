//! Task outcomes and the run report.

use std::fmt;

use converge_core::{Error, Result};

use crate::changes::FieldChange;
use crate::task::TaskName;

/// Mutation chosen for a task that needs one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyAction {
    Create,
    Update,
}

impl fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// Terminal state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// The provider was changed.
    Applied(ApplyAction),
    /// Nothing to do, or drift left alone by lifecycle.
    Skipped,
    /// Dry run: the action that would have been applied.
    Planned(ApplyAction),
    /// See the outcome's error.
    Failed,
}

impl TaskState {
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied(ApplyAction::Create) => write!(f, "created"),
            Self::Applied(ApplyAction::Update) => write!(f, "updated"),
            Self::Skipped => write!(f, "unchanged"),
            Self::Planned(action) => write!(f, "would {action}"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Per-task record in a run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub name: TaskName,
    pub kind: &'static str,
    pub state: TaskState,
    /// Provider identifier after the run, if known.
    pub id: Option<String>,
    /// Field changes found (applied, planned, or tolerated drift).
    pub changes: Vec<FieldChange>,
    pub error: Option<Error>,
}

impl TaskOutcome {
    /// A task that reached a non-failed state.
    #[must_use]
    pub fn finished(
        name: TaskName,
        kind: &'static str,
        state: TaskState,
        id: Option<String>,
        changes: Vec<FieldChange>,
    ) -> Self {
        Self {
            name,
            kind,
            state,
            id,
            changes,
            error: None,
        }
    }

    /// A task that failed, directly or because of another task.
    #[must_use]
    pub fn failed(name: TaskName, kind: &'static str, id: Option<String>, error: Error) -> Self {
        Self {
            name,
            kind,
            state: TaskState::Failed,
            id,
            changes: Vec::new(),
            error: Some(error),
        }
    }
}

/// Aggregate status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every task succeeded and at least one change was applied.
    Converged,
    /// Every task succeeded without applying anything.
    ConvergedWithNoChanges,
    /// Dry run finished; changes are pending.
    Planned,
    /// At least one task failed.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::ConvergedWithNoChanges => write!(f, "converged with no changes"),
            Self::Planned => write!(f, "planned"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one convergence run, one outcome per task in name order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: Vec<TaskOutcome>,
    pub status: RunStatus,
}

impl RunReport {
    /// Build a report, deriving the aggregate status from the outcomes.
    #[must_use]
    pub fn new(outcomes: Vec<TaskOutcome>) -> Self {
        let any = |pred: fn(TaskState) -> bool| outcomes.iter().any(|o| pred(o.state));
        let status = if any(TaskState::is_failed) {
            RunStatus::Failed
        } else if any(|s| matches!(s, TaskState::Planned(_))) {
            RunStatus::Planned
        } else if any(|s| matches!(s, TaskState::Applied(_))) {
            RunStatus::Converged
        } else {
            RunStatus::ConvergedWithNoChanges
        };
        Self { outcomes, status }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.count(|s| matches!(s, TaskState::Applied(_)))
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(|s| s == TaskState::Skipped)
    }

    #[must_use]
    pub fn planned_count(&self) -> usize {
        self.count(|s| matches!(s, TaskState::Planned(_)))
    }

    fn count(&self, pred: impl Fn(TaskState) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o.state)).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| o.state.is_failed())
    }

    /// Tasks whose own operation failed, excluding those only poisoned or aborted.
    pub fn root_failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.failed()
            .filter(|o| !o.error.as_ref().is_some_and(Error::is_secondary))
    }

    #[must_use]
    pub const fn is_converged(&self) -> bool {
        matches!(
            self.status,
            RunStatus::Converged | RunStatus::ConvergedWithNoChanges
        )
    }

    /// The aggregate result: number of applied changes, or every failed task.
    ///
    /// # Errors
    ///
    /// Returns `ConvergenceFailed` listing every failed task by name.
    pub fn into_result(self) -> Result<usize> {
        let failed: Vec<String> = self.failed().map(|o| o.name.clone()).collect();
        if failed.is_empty() {
            Ok(self.applied_count())
        } else {
            Err(Error::ConvergenceFailed { failed })
        }
    }
}
