//! Pluggable modules run by kiln after static folder changes.
//!
//! Both modules only write when their output would actually change, so
//! their own writes, once seen by the watcher, settle instead of looping.

pub mod images;
pub mod sprites;

pub use images::{ImageModule, SyncReport};
pub use sprites::SpriteModule;

use kiln_core::ModuleError;
use std::path::Path;

/// Run blocking filesystem work off the async runtime.
pub(crate) async fn blocking<T, F>(module: &str, work: F) -> Result<T, ModuleError>
where
    F: FnOnce() -> Result<T, ModuleError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ModuleError::Failed {
            module: module.to_string(),
            message: format!("Task join error: {e}"),
        })?
}

pub(crate) fn io_error(module: &str, path: &Path, source: std::io::Error) -> ModuleError {
    ModuleError::Io {
        module: module.to_string(),
        path: path.to_path_buf(),
        source,
    }
}
