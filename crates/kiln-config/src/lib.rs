//! Configuration for kiln projects.
//!
//! A [`KilnConfig`] is merged from built-in defaults, `kiln.toml` (or the
//! `kiln` field of `package.json`), `KILN_` environment variables and CLI
//! overrides, in increasing priority, then validated. It also derives the
//! [`SourceRootMap`](kiln_core::SourceRootMap) used to classify changes.

pub mod config;
pub mod discovery;
pub mod error;
pub mod loading;
pub mod validation;

pub use config::*;
pub use discovery::{ConfigDiscovery, ConfigSource};
pub use error::{ConfigError, Result};
pub use loading::{CliOverrides, ConfigLoader, DevOverrides};
pub use validation::validate_icon_selector;
