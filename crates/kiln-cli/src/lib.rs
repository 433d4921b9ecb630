//! Kiln CLI - incremental front-end asset builds with live reload.
//!
//! Everything that touches the outside world lives here; the decision logic
//! is in `kiln-core`.
//!
//! - [`cli`] - argument definitions
//! - [`commands`] - `build` and `dev`
//! - [`dev`] - the live-reload HTTP server and the filesystem watcher
//! - [`steps`] - external compiler and static copy steps
//! - [`error`] - CLI error type with hints
//! - [`logger`] / [`ui`] - tracing setup and status lines

pub mod cli;
pub mod commands;
pub mod dev;
pub mod error;
pub mod logger;
pub mod project;
pub mod scan;
pub mod steps;
pub mod ui;

pub use error::{CliError, Result, ResultExt};
