//! Filesystem watcher over the configured source roots.
//!
//! Only filters and forwards: debouncing belongs to `ChangeAccumulator` and
//! classification to the dev loop.

use std::path::{Path, PathBuf};

use kiln_core::SourceRootMap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::scan::IgnoreRules;

/// Raw change reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }

    fn from_kind(kind: &EventKind, path: PathBuf) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(FileChange::Created(path)),
            EventKind::Modify(_) => Some(FileChange::Modified(path)),
            EventKind::Remove(_) => Some(FileChange::Removed(path)),
            _ => None,
        }
    }
}

/// Keeps the OS watches alive; dropping it stops the event stream.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl FileWatcher {
    /// Watch every existing root recursively.
    ///
    /// Roots that do not exist yet are skipped with a warning; they are not
    /// picked up until the next `kiln dev`.
    pub fn new(
        roots: &SourceRootMap,
        ignore: IgnoreRules,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        let (tx, rx) = mpsc::channel(256);
        let filter_roots = roots.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("File watcher error: {}", e);
                    return;
                }
            };

            for path in event.paths {
                if ignore.is_ignored_under(&path, &filter_roots) {
                    continue;
                }
                let Some(change) = FileChange::from_kind(&event.kind, path) else {
                    continue;
                };
                // Receiver gone means the dev loop is shutting down
                if tx.blocking_send(change).is_err() {
                    return;
                }
            }
        })?;

        let mut watched = Vec::new();
        for (category, root) in roots.iter() {
            if !root.is_dir() {
                tracing::warn!("Not watching {} root {}: directory does not exist", category, root.display());
                continue;
            }
            watcher.watch(root, RecursiveMode::Recursive)?;
            tracing::debug!("Watching {} ({})", root.display(), category);
            watched.push(root.to_path_buf());
        }

        Ok((
            Self {
                _watcher: watcher,
                watched,
            },
            rx,
        ))
    }

    /// Roots actually being watched.
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}
