//! Concurrent, dependency-ordered execution of a task set.
//!
//! Tasks whose dependencies have all succeeded are started up to the
//! concurrency limit. A failed task poisons everything that depends on it,
//! directly or transitively. Under [`FailurePolicy::FailFast`] no new task is
//! started after the first failure; tasks already running finish.

use std::collections::{BTreeMap, HashMap, VecDeque};

use converge_core::{Error, Result};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::adapters::Adapters;
use crate::graph::DependencyGraph;
use crate::reconciler::{Reconciled, Reconciler};
use crate::retry::BackoffPolicy;
use crate::task::{DynTask, Resolved, TaskName, TaskSet};
use crate::types::{RunReport, TaskOutcome};

/// Default number of tasks reconciled at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// What happens to the rest of the run when a task fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Start nothing new; unstarted tasks are reported as aborted.
    #[default]
    FailFast,
    /// Keep running tasks that do not depend on the failure.
    ContinueIndependent,
}

/// Configuration for the runner.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Maximum tasks reconciled concurrently.
    pub max_concurrency: usize,
    pub failure_policy: FailurePolicy,
    /// Plan only: no create or update calls.
    pub dry_run: bool,
    /// Backoff for lookups.
    pub read_backoff: BackoffPolicy,
    /// Backoff for creates and updates.
    pub write_backoff: BackoffPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            failure_policy: FailurePolicy::default(),
            dry_run: false,
            read_backoff: BackoffPolicy::read(),
            write_backoff: BackoffPolicy::write(),
        }
    }
}

impl RunnerConfig {
    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero concurrency limit or a bad backoff policy.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::invalid_config("max_concurrency must be at least 1"));
        }
        self.read_backoff.validate()?;
        self.write_backoff.validate()
    }
}

type Finished = (TaskName, Box<dyn DynTask>, Result<Reconciled>);

/// Executes a task set against registered provider adapters.
#[derive(Debug)]
pub struct Runner {
    adapters: Adapters,
    reconciler: Reconciler,
    config: RunnerConfig,
}

impl Runner {
    #[must_use]
    pub fn new(adapters: Adapters, config: RunnerConfig) -> Self {
        let reconciler = Reconciler::new(config.read_backoff, config.write_backoff)
            .dry_run(config.dry_run);
        Self {
            adapters,
            reconciler,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    #[must_use]
    pub const fn adapters(&self) -> &Adapters {
        &self.adapters
    }

    /// Converge every task in `tasks`.
    ///
    /// Tasks are updated in place with provider-assigned values. Task failures
    /// are recorded in the report, not returned.
    ///
    /// # Errors
    ///
    /// Returns `GraphCycle` or `UnknownDependency` before any provider call
    /// when the dependency graph is malformed.
    pub async fn run(&self, tasks: &mut TaskSet) -> Result<RunReport> {
        let graph = DependencyGraph::build(tasks)?;
        let index = tasks.index();
        let limit = self.config.max_concurrency.max(1);
        let fail_fast = self.config.failure_policy == FailurePolicy::FailFast;

        info!(
            tasks = graph.len(),
            dependencies = graph.edge_count(),
            max_concurrency = limit,
            dry_run = self.config.dry_run,
            "Starting convergence"
        );

        let mut waiting: HashMap<TaskName, usize> = graph
            .nodes()
            .map(|name| (name.clone(), graph.dependency_count(name)))
            .collect();
        let mut ready: VecDeque<TaskName> = graph
            .topological_order()
            .into_iter()
            .filter(|name| waiting.get(name) == Some(&0))
            .collect();
        let mut outcomes: BTreeMap<TaskName, TaskOutcome> = BTreeMap::new();
        let mut resolved = Resolved::default();
        let mut in_flight: FuturesUnordered<BoxFuture<'_, Finished>> = FuturesUnordered::new();
        let mut abort_cause: Option<TaskName> = None;

        loop {
            while abort_cause.is_none() && in_flight.len() < limit {
                let Some(name) = ready.pop_front() else {
                    break;
                };
                if outcomes.contains_key(&name) {
                    continue;
                }
                if let Some(task) = tasks.take(&name) {
                    in_flight.push(self.start(name, task, resolved.clone()));
                }
            }

            let Some((name, task, result)) = in_flight.next().await else {
                break;
            };
            let kind = task.kind();
            let id = task.id();
            tasks.restore(name.clone(), task);

            match result {
                Ok(Reconciled { state, changes }) => {
                    if let Some(id) = &id {
                        resolved.insert(name.clone(), id.clone());
                    }
                    for dependent in graph.dependents(&name) {
                        if let Some(count) = waiting.get_mut(dependent) {
                            *count = count.saturating_sub(1);
                            if *count == 0 {
                                ready.push_back(dependent.clone());
                            }
                        }
                    }
                    outcomes.insert(
                        name.clone(),
                        TaskOutcome::finished(name, kind, state, id, changes),
                    );
                }
                Err(error) => {
                    warn!(task = %name, kind, error = %error, "Task failed");
                    for dependent in graph.transitive_dependents(&name) {
                        let dependent_kind = index.kind_of(&dependent).unwrap_or_default();
                        let dependent_id = tasks.id_of(&dependent);
                        outcomes.entry(dependent.clone()).or_insert_with(|| {
                            debug!(task = %dependent, failed = %name, "Skipping dependent of failed task");
                            TaskOutcome::failed(
                                dependent,
                                dependent_kind,
                                dependent_id,
                                Error::dependency_failed(&name),
                            )
                        });
                    }
                    if fail_fast && abort_cause.is_none() {
                        abort_cause = Some(name.clone());
                    }
                    outcomes.insert(name.clone(), TaskOutcome::failed(name, kind, id, error));
                }
            }
        }

        let cause = abort_cause.unwrap_or_default();
        for name in graph.nodes() {
            if !outcomes.contains_key(name) {
                let kind = index.kind_of(name).unwrap_or_default();
                outcomes.insert(
                    name.clone(),
                    TaskOutcome::failed(
                        name.clone(),
                        kind,
                        tasks.id_of(name),
                        Error::run_aborted(&cause),
                    ),
                );
            }
        }

        let report = RunReport::new(outcomes.into_values().collect());
        info!(
            status = %report.status,
            applied = report.applied_count(),
            planned = report.planned_count(),
            unchanged = report.skipped_count(),
            failed = report.failed().count(),
            "Convergence finished"
        );
        Ok(report)
    }

    fn start(
        &self,
        name: TaskName,
        mut task: Box<dyn DynTask>,
        resolved: Resolved,
    ) -> BoxFuture<'_, Finished> {
        let span = info_span!("task", task = %name, kind = task.kind());
        async move {
            debug!("Reconciling");
            let result = task
                .reconcile(&self.reconciler, &self.adapters, &resolved)
                .await;
            (name, task, result)
        }
        .instrument(span)
        .boxed()
    }
}

/// Builder for [`Runner`].
#[derive(Debug, Default)]
pub struct RunnerBuilder {
    adapters: Option<Adapters>,
    config: RunnerConfig,
}

impl RunnerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider adapters.
    #[must_use]
    pub fn with_adapters(mut self, adapters: Adapters) -> Self {
        self.adapters = Some(adapters);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn max_concurrency(mut self, max: usize) -> Self {
        self.config.max_concurrency = max;
        self
    }

    #[must_use]
    pub const fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.config.dry_run = enabled;
        self
    }

    #[must_use]
    pub const fn read_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.config.read_backoff = policy;
        self
    }

    #[must_use]
    pub const fn write_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.config.write_backoff = policy;
        self
    }

    /// Build the runner.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if no adapters were given or the configuration is invalid.
    pub fn build(self) -> Result<Runner> {
        let adapters = self
            .adapters
            .ok_or_else(|| Error::invalid_config("provider adapters are required"))?;
        self.config.validate()?;
        Ok(Runner::new(adapters, self.config))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::testkit::{FakeWidgets, Widget, WidgetApi};
    use crate::types::{ApplyAction, RunStatus, TaskState};
    use converge_core::Field;

    fn runner(fake: &Arc<FakeWidgets>) -> RunnerBuilder {
        RunnerBuilder::new()
            .with_adapters(Adapters::new().with::<dyn WidgetApi>(fake.clone()))
            .read_backoff(BackoffPolicy::immediate(4))
            .write_backoff(BackoffPolicy::immediate(5))
    }

    fn position(calls: &[String], call: &str) -> Option<usize> {
        calls.iter().position(|c| c == call)
    }

    #[tokio::test]
    async fn test_dependencies_converge_first_and_ids_flow_downstream() {
        let fake = Arc::new(FakeWidgets::new());
        let mut tasks = TaskSet::new()
            .with("child", Widget::named("child").with_parent("parent"))
            .with("parent", Widget::named("parent"));
        let runner = runner(&fake).build();
        assert!(runner.is_ok());
        let Ok(runner) = runner else { return };

        let report = runner.run(&mut tasks).await.ok();

        assert_eq!(report.as_ref().map(|r| r.status), Some(RunStatus::Converged));
        let calls = fake.calls();
        assert!(matches!(
            (position(&calls, "create parent"), position(&calls, "find child")),
            (Some(created), Some(found)) if created < found
        ));

        let parent_id = tasks.get::<Widget>("parent").map(|w| w.id.clone());
        let child_parent = tasks.get::<Widget>("child").map(|w| w.parent_id.clone());
        assert!(parent_id.as_ref().is_some_and(Field::is_set));
        assert_eq!(parent_id, child_parent);
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let fake = Arc::new(FakeWidgets::new());
        let build = || {
            TaskSet::new()
                .with("a", Widget::named("a").with_size(1))
                .with("b", Widget::named("b").with_parent("a"))
        };
        let runner = runner(&fake).build();
        assert!(runner.is_ok());
        let Ok(runner) = runner else { return };

        let first = runner.run(&mut build()).await.ok();
        let second = runner.run(&mut build()).await.ok();

        assert_eq!(first.map(|r| r.status), Some(RunStatus::Converged));
        assert_eq!(
            second.as_ref().map(|r| r.status),
            Some(RunStatus::ConvergedWithNoChanges)
        );
        assert_eq!(second.map(|r| r.skipped_count()), Some(2));
    }

    #[tokio::test]
    async fn test_cycle_is_rejected_before_any_provider_call() {
        let fake = Arc::new(FakeWidgets::new());
        let mut tasks = TaskSet::new()
            .with("a", Widget::named("a").with_parent("b"))
            .with("b", Widget::named("b").with_parent("a"));
        let runner = runner(&fake).build();
        assert!(runner.is_ok());
        let Ok(runner) = runner else { return };

        let result = runner.run(&mut tasks).await;

        assert!(matches!(result, Err(Error::GraphCycle { .. })));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fail_fast_poisons_dependents_and_aborts_unstarted() {
        let fake = Arc::new(FakeWidgets::new());
        fake.fail_next("create", Error::provider_fatal("quota"), 1);
        let mut tasks = TaskSet::new()
            .with("a", Widget::named("a"))
            .with("a-child", Widget::named("a-child").with_parent("a"))
            .with("z", Widget::named("z"));
        let runner = runner(&fake).max_concurrency(1).build();
        assert!(runner.is_ok());
        let Ok(runner) = runner else { return };

        let report = runner.run(&mut tasks).await.ok();
        let state_of = |name: &str| {
            report
                .as_ref()
                .and_then(|r| r.get(name))
                .map(|o| (o.state, o.error.clone()))
        };

        assert_eq!(
            state_of("a"),
            Some((TaskState::Failed, Some(Error::provider_fatal("quota"))))
        );
        assert_eq!(
            state_of("a-child"),
            Some((TaskState::Failed, Some(Error::dependency_failed("a"))))
        );
        assert_eq!(
            state_of("z"),
            Some((TaskState::Failed, Some(Error::run_aborted("a"))))
        );
        assert!(!fake.calls().iter().any(|c| c.ends_with("z")));
        assert_eq!(
            report.map(|r| r.into_result()),
            Some(Err(Error::ConvergenceFailed {
                failed: vec!["a".to_string(), "a-child".to_string(), "z".to_string()],
            }))
        );
    }

    #[tokio::test]
    async fn test_poisoned_dependent_keeps_its_identifier() {
        let fake = Arc::new(FakeWidgets::new());
        fake.fail_next("create", Error::provider_fatal("quota"), 1);
        let mut child = Widget::named("child").with_parent("a");
        child.id = Field::Set("child-1".to_string());
        let mut tasks = TaskSet::new()
            .with("a", Widget::named("a"))
            .with("child", child);
        let runner = runner(&fake).build();
        assert!(runner.is_ok());
        let Ok(runner) = runner else { return };

        let report = runner.run(&mut tasks).await.ok();
        let child = report.as_ref().and_then(|r| r.get("child"));

        assert_eq!(
            child.map(|o| (o.id.clone(), o.error.clone())),
            Some((
                Some("child-1".to_string()),
                Some(Error::dependency_failed("a"))
            ))
        );
    }

    #[tokio::test]
    async fn test_continue_independent_finishes_unrelated_tasks() {
        let fake = Arc::new(FakeWidgets::new());
        fake.fail_next("create", Error::provider_fatal("quota"), 1);
        let mut tasks = TaskSet::new()
            .with("a", Widget::named("a"))
            .with("a-child", Widget::named("a-child").with_parent("a"))
            .with("z", Widget::named("z"));
        let runner = runner(&fake)
            .max_concurrency(1)
            .failure_policy(FailurePolicy::ContinueIndependent)
            .build();
        assert!(runner.is_ok());
        let Ok(runner) = runner else { return };

        let report = runner.run(&mut tasks).await.ok();

        assert_eq!(
            report.as_ref().and_then(|r| r.get("z")).map(|o| o.state),
            Some(TaskState::Applied(ApplyAction::Create))
        );
        assert_eq!(
            report.as_ref().and_then(|r| r.get("a-child")).map(|o| o.state),
            Some(TaskState::Failed)
        );
        assert!(!fake.calls().iter().any(|c| c.ends_with("a-child")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_is_respected() {
        let fake = Arc::new(FakeWidgets::new().with_latency(Duration::from_millis(50)));
        let mut tasks = TaskSet::new();
        for i in 0..6 {
            let name = format!("w{i}");
            tasks.insert(name.clone(), Widget::named(&name));
        }
        let runner = runner(&fake).max_concurrency(2).build();
        assert!(runner.is_ok());
        let Ok(runner) = runner else { return };

        let report = runner.run(&mut tasks).await.ok();

        assert_eq!(report.map(|r| r.applied_count()), Some(6));
        assert_eq!(fake.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_plans_every_task() {
        let fake = Arc::new(FakeWidgets::new());
        let mut tasks = TaskSet::new()
            .with("a", Widget::named("a"))
            .with("b", Widget::named("b").with_parent("a"));
        let runner = runner(&fake).dry_run(true).build();
        assert!(runner.is_ok());
        let Ok(runner) = runner else { return };

        let report = runner.run(&mut tasks).await.ok();

        assert_eq!(report.as_ref().map(|r| r.status), Some(RunStatus::Planned));
        assert_eq!(report.map(|r| r.planned_count()), Some(2));
        assert!(fake.calls().iter().all(|c| c.starts_with("find")));
    }

    #[tokio::test]
    async fn test_missing_adapter_fails_the_task() {
        let mut tasks = TaskSet::new().with("a", Widget::named("a"));
        let runner = RunnerBuilder::new().with_adapters(Adapters::new()).build();
        assert!(runner.is_ok());
        let Ok(runner) = runner else { return };

        let report = runner.run(&mut tasks).await.ok();

        assert_eq!(
            report.and_then(|r| r.get("a").and_then(|o| o.error.clone())),
            Some(Error::missing_adapter("Widget"))
        );
    }

    #[test]
    fn test_builder_requires_adapters() {
        let result = RunnerBuilder::new().build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_rejects_zero_concurrency() {
        let result = RunnerBuilder::new()
            .with_adapters(Adapters::new())
            .max_concurrency(0)
            .build();
        assert!(result.is_err());
    }
}
