//! # converge
//!
//! Entry point for the `converge` command line.
//!
//! ## Commands
//!
//! - `plan`: dry run against the saved provider state
//! - `apply`: converge and write the provider state back
//! - `graph`: print the convergence order of a manifest
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); the report goes to stdout.
//! Any failed resource makes the process exit non-zero.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use converge::cli::Cli;
use converge::commands::execute_command;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    execute_command(Cli::parse()).await
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
