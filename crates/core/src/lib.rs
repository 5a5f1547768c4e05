//! # converge-core
//!
//! Shared vocabulary for the convergence engine: the error taxonomy, the
//! three-state [`Field`] used by every resource description, and the
//! per-task [`Lifecycle`] policy.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod field;
pub mod lifecycle;

pub use error::{Error, Result};
pub use field::Field;
pub use lifecycle::Lifecycle;
