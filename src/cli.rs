//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// converge - declarative resource convergence
#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(version)]
#[command(about = "Find, diff and apply infrastructure resources in dependency order")]
#[command(
    long_about = "converge reads a manifest of desired resources, compares each one with the provider, and creates or updates what differs. Dependencies converge first; independent resources converge concurrently."
)]
pub struct Cli {
    /// Runner and backoff configuration (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Manifest and provider state a command works on.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Desired-state manifest (YAML, or JSON with a .json extension)
    #[arg(short, long)]
    pub desired: PathBuf,

    /// Provider state snapshot; created on first apply
    #[arg(short, long)]
    pub state: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show what apply would change without changing anything
    Plan {
        #[command(flatten)]
        target: Target,
    },

    /// Converge the provider toward the manifest and save its state
    Apply {
        #[command(flatten)]
        target: Target,

        /// Maximum resources reconciled at once
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Keep converging resources unrelated to a failure
        #[arg(long, default_value_t = false)]
        continue_independent: bool,
    },

    /// Print the order resources converge in
    Graph {
        /// Desired-state manifest
        #[arg(short, long)]
        desired: PathBuf,
    },
}
