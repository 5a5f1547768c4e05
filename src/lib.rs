#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # converge
//!
//! Command line front end for the convergence engine. Re-exports the
//! workspace crates for convenience.

pub use converge_cloud;
pub use converge_core;
pub use converge_reconciler;

pub mod cli;
pub mod commands;
