//! Per-task reconciliation: find, diff, validate, apply.

use converge_core::{Error, Lifecycle, Result};
use tracing::{debug, info, warn};

use crate::changes::{ChangeSet, FieldChange};
use crate::retry::{Attempt, BackoffPolicy, retry};
use crate::task::{Resolved, Resource};
use crate::types::{ApplyAction, TaskState};

/// What reconciling one task produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub state: TaskState,
    pub changes: Vec<FieldChange>,
}

impl Reconciled {
    const fn new(state: TaskState, changes: Vec<FieldChange>) -> Self {
        Self { state, changes }
    }
}

/// Drives a single task from its expected state to the provider.
#[derive(Debug, Clone)]
pub struct Reconciler {
    read: BackoffPolicy,
    write: BackoffPolicy,
    dry_run: bool,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(BackoffPolicy::read(), BackoffPolicy::write())
    }
}

impl Reconciler {
    #[must_use]
    pub const fn new(read: BackoffPolicy, write: BackoffPolicy) -> Self {
        Self {
            read,
            write,
            dry_run: false,
        }
    }

    /// Stop before any create or update and report the planned action.
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Reconcile one task.
    ///
    /// On success `expected` carries every provider-assigned value, so its
    /// identifier can be handed to dependents.
    ///
    /// # Errors
    ///
    /// Returns validation, lifecycle, and provider errors. Transient provider
    /// errors surface as `RetryExhausted` once the policy gives up.
    pub async fn reconcile<R: Resource>(
        &self,
        expected: &mut R,
        adapter: &R::Adapter,
        resolved: &Resolved,
    ) -> Result<Reconciled> {
        expected.resolve(resolved)?;
        let lifecycle = expected.lifecycle();

        let actual = {
            let current: &R = expected;
            let operation = format!("find {}", R::KIND);
            retry(&self.read, &operation, || async move {
                Attempt::from(current.find(adapter).await)
            })
            .await?
        };
        debug!(exists = actual.is_some(), "Looked up actual state");

        if actual.is_none() && lifecycle.requires_existing() {
            return Err(Error::lifecycle_violation(
                lifecycle,
                "object was not found",
            ));
        }
        // A create would assign a different identifier.
        if actual.is_none() && expected.id().is_set() {
            return Err(Error::cannot_change_field("ID"));
        }

        let changes = ChangeSet::compute(actual.as_ref(), expected);
        debug!(changed = changes.len(), "Computed change set");

        if let Some(actual) = actual.as_ref() {
            if changes.is_empty() {
                expected.absorb(actual)?;
                debug!("No changes");
                return Ok(Reconciled::new(TaskState::Skipped, changes.into_entries()));
            }
            match lifecycle {
                Lifecycle::ExistsAndValidates => {
                    return Err(Error::lifecycle_violation(
                        lifecycle,
                        format!("object did not match: {}", changes.field_names()),
                    ));
                }
                Lifecycle::ExistsAndWarnIfChanges => {
                    warn!(
                        fields = %changes.field_names(),
                        "Object differs from desired state; leaving it unchanged"
                    );
                    expected.absorb(actual)?;
                    return Ok(Reconciled::new(TaskState::Skipped, changes.into_entries()));
                }
                Lifecycle::Sync => {}
            }
        }

        R::check_changes(actual.as_ref(), expected, &changes)?;

        let action = if actual.is_some() {
            ApplyAction::Update
        } else {
            ApplyAction::Create
        };

        if self.dry_run {
            if let Some(actual) = actual.as_ref() {
                expected.absorb(actual)?;
            }
            info!(%action, fields = %changes.field_names(), "Planned");
            return Ok(Reconciled::new(
                TaskState::Planned(action),
                changes.into_entries(),
            ));
        }

        let operation = format!("{action} {}", R::KIND);
        let applied = match actual.as_ref() {
            None => {
                let current: &R = expected;
                retry(&self.write, &operation, || async move {
                    Attempt::from(current.create(adapter).await)
                })
                .await?
            }
            Some(actual) => {
                let id = actual.id().value().cloned().ok_or_else(|| {
                    Error::provider_fatal(format!("existing {} has no identifier", R::KIND))
                })?;
                let id = id.as_str();
                let delta = changes.delta();
                retry(&self.write, &operation, || async move {
                    Attempt::from(delta.update(id, adapter).await)
                })
                .await?
            }
        };

        if let Some(actual) = actual.as_ref() {
            expected.absorb(actual)?;
        }
        expected.absorb(&applied)?;
        info!(%action, fields = %changes.field_names(), "Applied");
        Ok(Reconciled::new(
            TaskState::Applied(action),
            changes.into_entries(),
        ))
    }
}
