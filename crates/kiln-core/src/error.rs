//! Error taxonomy for the orchestrator.
//!
//! Only [`LifecycleError`] is ever fatal, and only to the start/stop/restart
//! attempt that produced it. The other kinds are collected per category or
//! per module and reported without interrupting the batch.

use crate::category::Category;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// A watched path that could not be mapped to a single category.
///
/// Not a failure: callers log it at debug level and move on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    /// The path is not below any configured source root
    #[error("{} is outside every configured source root", .0.display())]
    OutsideRoots(PathBuf),

    /// The root directory itself was touched (rename, removal, ...).
    /// The caller has to re-scan the root instead of assuming one file.
    #[error("source root {} was touched directly", .0.display())]
    RootTouched(PathBuf),
}

/// A single category's compiler step failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildStepError {
    /// The compiler ran and reported failure
    #[error("{category} step failed: {message}")]
    Failed {
        category: Category,
        message: String,
        /// Compiler output (stderr) when available
        diagnostics: Option<String>,
    },

    /// The compiler could not be launched at all
    #[error("{category} step could not start `{command}`: {message}")]
    Spawn {
        category: Category,
        command: String,
        message: String,
    },

    /// The step panicked instead of returning an error
    #[error("{category} step panicked: {message}")]
    Panicked { category: Category, message: String },
}

impl BuildStepError {
    /// Category whose step produced this error.
    pub fn category(&self) -> Category {
        match self {
            BuildStepError::Failed { category, .. }
            | BuildStepError::Spawn { category, .. }
            | BuildStepError::Panicked { category, .. } => *category,
        }
    }

    /// Compiler diagnostics, if the step captured any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            BuildStepError::Failed { diagnostics, .. } => diagnostics.as_deref(),
            _ => None,
        }
    }
}

/// The dev server could not be started, stopped or signalled.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Binding the listening socket failed (port genuinely occupied, ...)
    #[error("failed to bind dev server to {addr}: {source}\n\nHint: Another process may be using this port")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The previous listener did not release its port in time
    #[error("port {} was not released within {timeout_ms}ms", .addr.port())]
    PortNotReleased { addr: SocketAddr, timeout_ms: u64 },

    /// The running server could not deliver a reload signal
    #[error("failed to send reload signal: {0}")]
    Reload(String),

    /// Any other I/O failure while serving
    #[error("dev server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A pluggable module's `start` failed.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The module reported a failure
    #[error("module '{module}' failed: {message}")]
    Failed { module: String, message: String },

    /// The module panicked
    #[error("module '{module}' panicked: {message}")]
    Panicked { module: String, message: String },

    /// File operation failed inside the module
    #[error("module '{module}' I/O error on {}: {source}", .path.display())]
    Io {
        module: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_step_error_category() {
        let err = BuildStepError::Failed {
            category: Category::Style,
            message: "exit status 1".to_string(),
            diagnostics: Some("Undefined variable $brand".to_string()),
        };
        assert_eq!(err.category(), Category::Style);
        assert_eq!(err.diagnostics(), Some("Undefined variable $brand"));
        assert!(err.to_string().contains("style step failed"));
    }

    #[test]
    fn test_lifecycle_error_port_not_released() {
        let err = LifecycleError::PortNotReleased {
            addr: "127.0.0.1:3000".parse().unwrap(),
            timeout_ms: 5000,
        };
        let msg = err.to_string();
        assert!(msg.contains("3000"));
        assert!(msg.contains("5000ms"));
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic payload");
    }
}
