//! CLI command handlers.
//!
//! All commands follow the same shape:
//! - Zero unwraps, zero panics
//! - Library errors wrapped with `anyhow` context at this edge
//! - Rendering kept pure so it can be tested without a terminal

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use converge_cloud::{Manifest, MemoryCloud};
use converge_reconciler::{
    ApplyAction, ConvergeConfig, DependencyGraph, FailurePolicy, RunReport, RunnerBuilder,
    RunnerConfig, TaskSet, TaskState,
};
use tracing::info;

use crate::cli::{Cli, Commands, Target};

/// Execute a CLI command.
///
/// # Errors
///
/// Returns an error if an input cannot be loaded, the dependency graph is
/// malformed, or any resource failed to converge.
pub async fn execute_command(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Plan { target } => cmd_plan(&target, config).await,
        Commands::Apply {
            target,
            max_concurrency,
            continue_independent,
        } => cmd_apply(&target, config, max_concurrency, continue_independent).await,
        Commands::Graph { desired } => cmd_graph(&desired),
    }
}

fn load_config(path: Option<&Path>) -> Result<ConvergeConfig> {
    path.map_or_else(
        || Ok(ConvergeConfig::default()),
        |path| {
            ConvergeConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))
        },
    )
}

fn load_tasks(desired: &Path) -> Result<TaskSet> {
    let manifest = Manifest::load(desired)
        .with_context(|| format!("Failed to load manifest {}", desired.display()))?;
    info!(path = %desired.display(), tasks = manifest.len(), "Loaded manifest");
    Ok(manifest.into_task_set())
}

fn load_cloud(state: &Path) -> Result<Arc<MemoryCloud>> {
    MemoryCloud::load_snapshot(state)
        .map(Arc::new)
        .with_context(|| format!("Failed to load state {}", state.display()))
}

async fn converge(
    cloud: &Arc<MemoryCloud>,
    config: RunnerConfig,
    tasks: &mut TaskSet,
) -> Result<RunReport> {
    let runner = RunnerBuilder::new()
        .with_adapters(cloud.adapters())
        .with_config(config)
        .build()
        .context("Invalid runner configuration")?;
    runner
        .run(tasks)
        .await
        .context("Dependency graph is malformed")
}

/// Dry run: report what apply would do.
async fn cmd_plan(target: &Target, config: ConvergeConfig) -> Result<()> {
    let mut runner_config = config.runner_config();
    runner_config.dry_run = true;

    let cloud = load_cloud(&target.state)?;
    let mut tasks = load_tasks(&target.desired)?;
    let report = converge(&cloud, runner_config, &mut tasks).await?;

    print!("{}", render_report(&report));
    report.into_result().map(|_| ()).context("Plan failed")
}

/// Converge, then persist provider state even if some resources failed.
async fn cmd_apply(
    target: &Target,
    config: ConvergeConfig,
    max_concurrency: Option<usize>,
    continue_independent: bool,
) -> Result<()> {
    let mut runner_config = config.runner_config();
    if let Some(max) = max_concurrency {
        runner_config.max_concurrency = max;
    }
    if continue_independent {
        runner_config.failure_policy = FailurePolicy::ContinueIndependent;
    }

    let cloud = load_cloud(&target.state)?;
    let mut tasks = load_tasks(&target.desired)?;
    let report = converge(&cloud, runner_config, &mut tasks).await?;

    cloud
        .save_snapshot(&target.state)
        .await
        .with_context(|| format!("Failed to save state {}", target.state.display()))?;

    print!("{}", render_report(&report));
    let applied = report.into_result().context("Apply failed")?;
    info!(applied, "Apply complete");
    Ok(())
}

/// Print the convergence order.
fn cmd_graph(desired: &Path) -> Result<()> {
    let tasks = load_tasks(desired)?;
    let graph = DependencyGraph::build(&tasks).context("Dependency graph is malformed")?;
    print!("{}", render_graph(&graph));
    Ok(())
}

const fn marker(state: TaskState) -> char {
    match state {
        TaskState::Applied(ApplyAction::Create) | TaskState::Planned(ApplyAction::Create) => '+',
        TaskState::Applied(ApplyAction::Update) | TaskState::Planned(ApplyAction::Update) => '~',
        TaskState::Skipped => '=',
        TaskState::Failed => '!',
    }
}

/// One line per task, its field changes indented below, then a summary.
#[must_use]
pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        let _ = write!(
            out,
            "{} {} ({}) {}",
            marker(outcome.state),
            outcome.name,
            outcome.kind,
            outcome.state
        );
        if let Some(id) = &outcome.id {
            let _ = write!(out, " [{id}]");
        }
        if let Some(error) = &outcome.error {
            let _ = write!(out, ": {error}");
        }
        out.push('\n');
        for change in &outcome.changes {
            let _ = writeln!(out, "    {change}");
        }
    }
    let _ = writeln!(
        out,
        "{}: {} applied, {} planned, {} unchanged, {} failed",
        report.status,
        report.applied_count(),
        report.planned_count(),
        report.skipped_count(),
        report.failed().count()
    );
    out
}

/// Tasks in convergence order with what each waits for.
#[must_use]
pub fn render_graph(graph: &DependencyGraph) -> String {
    let mut out = String::new();
    for name in graph.topological_order() {
        let dependencies = graph.dependencies(&name);
        if dependencies.is_empty() {
            let _ = writeln!(out, "{name}");
        } else {
            let waits: Vec<&str> = dependencies.iter().map(|d| d.as_str()).collect();
            let _ = writeln!(out, "{name} <- {}", waits.join(", "));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_reconciler::{ChangeKind, FieldChange, TaskOutcome};

    #[test]
    fn test_render_report_lists_changes_and_summary() {
        let report = RunReport::new(vec![TaskOutcome::finished(
            "net".to_string(),
            "Network",
            TaskState::Applied(ApplyAction::Create),
            Some("net-1".to_string()),
            vec![FieldChange {
                field: "Name",
                kind: ChangeKind::NewlySet,
                from: "<unset>".to_string(),
                to: "\"private\"".to_string(),
            }],
        )]);

        let text = render_report(&report);
        assert!(text.starts_with("+ net (Network) created [net-1]\n"));
        assert!(text.contains("    Name set: <unset> -> \"private\"\n"));
        assert!(text.ends_with("converged: 1 applied, 0 planned, 0 unchanged, 0 failed\n"));
    }

    #[test]
    fn test_render_graph_shows_waits() {
        let entries = [("lb", vec!["subnet"]), ("subnet", vec!["net"]), ("net", vec![])];
        let graph = DependencyGraph::from_dependencies(entries.into_iter().map(|(name, deps)| {
            (
                name.to_string(),
                deps.into_iter().map(str::to_string).collect::<Vec<_>>(),
            )
        }));
        let text = graph.map(|g| render_graph(&g)).ok();
        assert_eq!(
            text.as_deref(),
            Some("net\nsubnet <- net\nlb <- subnet\n")
        );
    }
}
