//! Error handling for the kiln CLI.
//!
//! `CliError` is what every command returns. Library errors convert into it
//! through `#[from]`, and [`ResultExt`] attaches paths, hints and context on
//! the way up. `main` turns the final error into a `miette` report.

use std::path::PathBuf;

use kiln_core::{Category, LifecycleError};
use thiserror::Error;

mod miette;

pub use self::miette::cli_error_to_miette;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Config discovery, parsing or validation failed
    #[error("Configuration error: {0}")]
    Config(#[from] kiln_config::ConfigError),

    /// At least one build step or module failed
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The dev server could not be started or stopped
    #[error("Server error: {0}")]
    Server(#[from] LifecycleError),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0}")]
    Custom(String),
}

/// Build failures reported after every step has had its chance to run.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{} step(s) failed: {}\n\nHint: Compiler output is printed above each failure", .0.len(), join(.0))]
    StepsFailed(Vec<Category>),

    #[error("module(s) failed: {}\n\nHint: Check the entry and dist paths under [modules]", .0.join(", "))]
    ModulesFailed(Vec<String>),

    /// No compiler command for a category whose sources exist
    #[error("No compiler configured for {category} sources in {}\n\nHint: Set compilers.{category} in kiln.toml", .root.display())]
    MissingCompiler { category: Category, root: PathBuf },
}

fn join(categories: &[Category]) -> String {
    categories
        .iter()
        .map(Category::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Turn a not-found I/O error into [`CliError::FileNotFound`] for `path`.
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Append a `Hint:` line to the error message.
    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T>;

    /// Prefix the error message.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                CliError::FileNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}\n\nHint: {}", err, hint))
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}: {}", msg, err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_failed_lists_categories() {
        let err = BuildError::StepsFailed(vec![Category::Style, Category::Script]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 step(s) failed: style, script"));
        assert!(msg.contains("Hint:"));
    }

    #[test]
    fn missing_compiler_names_the_key() {
        let err = BuildError::MissingCompiler {
            category: Category::Template,
            root: PathBuf::from("src/pug"),
        };
        assert!(err.to_string().contains("compilers.template"));
    }

    #[test]
    fn config_error_converts() {
        let err: CliError = kiln_config::ConfigError::NotFound(PathBuf::from("kiln.toml")).into();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn lifecycle_error_converts() {
        let err: CliError = LifecycleError::PortNotReleased {
            addr: "127.0.0.1:3000".parse().unwrap(),
            timeout_ms: 5000,
        }
        .into();
        assert!(matches!(err, CliError::Server(_)));
        assert!(err.to_string().contains("3000"));
    }

    #[test]
    fn with_path_maps_not_found() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        let err = result.with_path("/test/path.txt").unwrap_err();
        assert!(matches!(err, CliError::FileNotFound(_)));
    }

    #[test]
    fn with_path_keeps_other_io_errors() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = result.with_path("/test/path.txt").unwrap_err();
        assert!(matches!(err, CliError::Io(_)));
    }

    #[test]
    fn hint_and_context() {
        let result: std::result::Result<(), CliError> = Err(CliError::Custom("boom".into()));
        let err = result.with_hint("Try again").unwrap_err();
        assert!(err.to_string().ends_with("Hint: Try again"));

        let result: std::result::Result<(), CliError> = Err(CliError::Custom("boom".into()));
        let err = result.context("Initial build").unwrap_err();
        assert_eq!(err.to_string(), "Initial build: boom");
    }
}
