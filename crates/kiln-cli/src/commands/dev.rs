//! `kiln dev`: initial build, live-reload server and the watch loop.
//!
//! ```text
//! FileWatcher -> DevLoop (classify, accumulate) -> BuildOrchestrator
//!                                                    |-> steps
//!                                                    |-> DevServerLifecycle::reload
//!                                                    `-> ModuleRunner
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kiln_core::{
    BuildOrchestrator, ChangeAccumulator, ClassificationError, DevServerLifecycle, Dispatch,
    SourceRootMap, try_classify,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};

use crate::commands::build_all;
use crate::dev::{FileChange, FileWatcher, LiveReloadBackend};
use crate::error::{Result, ResultExt};
use crate::project::Project;
use crate::scan::{self, IgnoreRules};
use crate::ui;

pub async fn execute(project: Project) -> Result<()> {
    let roots = project.roots();
    let ignore = project.ignore_rules();
    let server_config = project.server_config()?;
    let registry = Arc::new(project.registry());
    let modules = Arc::new(project.modules());

    let dist = project.dist();
    std::fs::create_dir_all(&dist).with_path(&dist)?;

    ui::info("Performing initial build...");
    let outcome = build_all(&project, Arc::clone(&registry), &modules).await;
    if outcome.is_success() {
        ui::success(&format!(
            "Initial build completed in {}",
            ui::format_duration(outcome.duration)
        ));
    } else {
        ui::warning("Initial build had failures; fix them and save to rebuild");
    }

    let lifecycle = Arc::new(DevServerLifecycle::new(Arc::new(LiveReloadBackend::new(
        &dist,
    ))));
    let handle = lifecycle.start(&server_config).await?;
    ui::success(&format!("Dev server running at {}", handle.url()));
    ui::info(&format!("Serving {}", dist.display()));

    if project.config.dev.open {
        open_browser(&handle.url());
    }

    let orchestrator = Arc::new(
        BuildOrchestrator::new(registry)
            .with_lifecycle(Arc::clone(&lifecycle))
            .with_hook(modules),
    );

    let (watcher, changes) = FileWatcher::new(&roots, ignore.clone())?;
    ui::info(&format!("Watching {} source root(s)", watcher.watched().len()));
    ui::info("Press Ctrl+C to stop");

    let mut dev_loop = DevLoop::new(roots, ignore, project.config.dev.debounce());
    dev_loop
        .run(changes, orchestrator, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await;

    drop(watcher);
    ui::info("Shutting down development server...");
    lifecycle.stop().await?;
    ui::success("Development server stopped");
    Ok(())
}

/// Classifies watcher events, debounces them and hands settled batches to
/// the orchestrator.
pub struct DevLoop {
    roots: SourceRootMap,
    ignore: IgnoreRules,
    accumulator: ChangeAccumulator,
}

impl DevLoop {
    pub fn new(roots: SourceRootMap, ignore: IgnoreRules, debounce: Duration) -> Self {
        Self {
            roots,
            ignore,
            accumulator: ChangeAccumulator::new(debounce),
        }
    }

    pub fn accumulator(&self) -> &ChangeAccumulator {
        &self.accumulator
    }

    /// Classify one raw change into the pending batch. Returns how many
    /// paths were recorded.
    ///
    /// A directory created under a root, or a root replaced wholesale, is
    /// re-scanned so every file inside is recorded.
    pub fn record(&mut self, change: &FileChange) -> usize {
        let path = change.path();
        if self.ignore.is_ignored_under(path, &self.roots) {
            tracing::trace!("Ignoring {}", path.display());
            return 0;
        }

        match try_classify(path, &self.roots) {
            Ok(category) => {
                if path.is_dir() {
                    return match change {
                        FileChange::Created(_) => self.rescan(path),
                        _ => 0,
                    };
                }
                self.accumulator.record(path, category);
                1
            }
            Err(ClassificationError::RootTouched(root)) => {
                tracing::debug!("Source root {} touched, rescanning", root.display());
                if root.is_dir() {
                    return self.rescan(&root);
                }
                // Root removed: its category still has to catch up
                let category = self
                    .roots
                    .iter()
                    .find(|(_, candidate)| *candidate == root.as_path())
                    .map(|(category, _)| category);
                match category {
                    Some(category) => {
                        self.accumulator.record(root, category);
                        1
                    }
                    None => 0,
                }
            }
            Err(err @ ClassificationError::OutsideRoots(_)) => {
                tracing::debug!("{}", err);
                0
            }
        }
    }

    fn rescan(&mut self, dir: &Path) -> usize {
        let found = scan::scan(dir, &self.roots, &self.ignore);
        let count = found.len();
        for (category, path) in found {
            self.accumulator.record(path, category);
        }
        count
    }

    /// Run until `shutdown` resolves or the watcher goes away.
    ///
    /// Batches are dispatched without waiting, so events keep flowing into
    /// the accumulator while a build runs; the orchestrator serializes them.
    /// Batches still building at shutdown are aborted.
    pub async fn run(
        &mut self,
        mut changes: mpsc::Receiver<FileChange>,
        orchestrator: Arc<BuildOrchestrator>,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        let mut in_flight = JoinSet::new();

        loop {
            let deadline = self.accumulator.deadline();

            tokio::select! {
                _ = &mut shutdown => break,

                change = changes.recv() => match change {
                    Some(change) => {
                        let recorded = self.record(&change);
                        tracing::trace!("{:?} recorded {} path(s)", change, recorded);
                    }
                    None => {
                        tracing::warn!("File watcher stopped");
                        break;
                    }
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(batch) = self.accumulator.flush_if_settled() {
                        let orchestrator = Arc::clone(&orchestrator);
                        in_flight.spawn(async move {
                            report(orchestrator.on_change(batch).await);
                        });
                    }
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Build task failed: {}", e);
                    }
                }
            }
        }

        in_flight.shutdown().await;
    }
}

fn report(dispatch: Dispatch) {
    match dispatch {
        Dispatch::Processed(reports) => reports.iter().for_each(ui::print_batch_summary),
        Dispatch::Queued => tracing::debug!("Batch queued behind the running build"),
        Dispatch::Ignored => {}
    }
}

/// Open `url` in the default browser.
fn open_browser(url: &str) {
    use std::process::Command;

    let result = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", url]).spawn()
    } else {
        Command::new("xdg-open").arg(url).spawn()
    };

    match result {
        Ok(_) => ui::info(&format!("Opened browser at {}", url)),
        Err(e) => ui::warning(&format!("Failed to open browser: {}", e)),
    }
}
