//! Declarative, dependency-ordered convergence of provider resources.
//!
//! Each task describes one resource the way it *should* be. A run drives every
//! task toward that state:
//!
//! - **Find**: look up the actual object at the provider
//! - **Diff**: compute the per-field [`ChangeSet`]
//! - **Check**: reject missing required fields and changes to immutable ones
//! - **Apply**: create or update, then absorb provider-assigned values
//!
//! Tasks run concurrently once their dependencies have converged; identifiers
//! assigned to a dependency flow into the tasks that reference it.
//!
//! # Example
//!
//! ```ignore
//! use converge_reconciler::{Adapters, RunnerBuilder, TaskSet};
//!
//! let adapters = Adapters::new().with::<dyn SubnetApi>(cloud.clone());
//! let runner = RunnerBuilder::new().with_adapters(adapters).build()?;
//!
//! let mut tasks = TaskSet::new().with("private", subnet);
//! let report = runner.run(&mut tasks).await?;
//! report.into_result()?;
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod adapters;
pub mod changes;
pub mod config;
pub mod graph;
pub mod reconciler;
pub mod retry;
pub mod runner;
pub mod task;
pub mod types;

#[cfg(test)]
mod testkit;

// Re-export main types
pub use adapters::Adapters;
pub use changes::{ChangeKind, ChangeSet, Differ, FieldChange};
pub use config::{BackoffSection, BackoffSettings, ConvergeConfig, RunnerSection};
pub use converge_core::{Error, Field, Lifecycle, Result};
pub use graph::DependencyGraph;
pub use reconciler::{Reconciled, Reconciler};
pub use retry::{Attempt, BackoffPolicy, RetryOutcome, retry, with_retry};
pub use runner::{FailurePolicy, Runner, RunnerBuilder, RunnerConfig};
pub use task::{Resolved, Resource, TaskIndex, TaskName, TaskRef, TaskSet};
pub use types::{ApplyAction, RunReport, RunStatus, TaskOutcome, TaskState};
