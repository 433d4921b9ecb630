//! Contract between the orchestrator and pluggable modules.
//!
//! The orchestrator calls exactly one [`UpdateHook`] per settled batch, after
//! every build step has finished and after the reload. Modules never see raw
//! filesystem events and never get access to the dev server; anything they
//! want the browser to pick up has to be written to disk, where the watcher
//! will classify it like any other change.

use crate::changes::{ChangeSet, ChangeSummary};
use crate::error::{panic_message, ModuleError};
use crate::registry::BuildStepResult;
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// What the hook sees for one batch.
#[derive(Debug, Clone, Copy)]
pub struct Update<'a> {
    /// Boolean-per-category view
    pub changes: ChangeSummary,
    /// Full path sets of the batch
    pub change_set: &'a ChangeSet,
    /// Outcome of every step that ran
    pub results: &'a [BuildStepResult],
}

impl<'a> Update<'a> {
    pub fn new(change_set: &'a ChangeSet, results: &'a [BuildStepResult]) -> Self {
        Self {
            changes: change_set.summary(),
            change_set,
            results,
        }
    }

    /// Whether any step in this batch failed.
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(BuildStepResult::failed)
    }
}

/// The `onUpdate` callback.
///
/// Never invoked concurrently with itself; the next call only happens after
/// the previous one has returned.
#[async_trait]
pub trait UpdateHook: Send + Sync {
    async fn on_update(&self, update: &Update<'_>);
}

/// Hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

#[async_trait]
impl UpdateHook for NoopHook {
    async fn on_update(&self, _update: &Update<'_>) {}
}

/// Per-invocation input handed to [`Module::start`].
///
/// Module specific options (entry, dist, ...) are captured when the module
/// is constructed; only what changes between invocations travels here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleContext {
    pub debug: bool,
    pub changes: ChangeSummary,
}

/// A pluggable unit of work triggered by settled changes.
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self, ctx: &ModuleContext) -> Result<(), ModuleError>;
}

/// A module registered at configuration time.
#[derive(Clone)]
pub struct ModuleHandle {
    name: String,
    module: Arc<dyn Module>,
}

impl ModuleHandle {
    pub fn new(module: impl Module + 'static) -> Self {
        Self::from_arc(Arc::new(module))
    }

    pub fn from_arc(module: Arc<dyn Module>) -> Self {
        Self {
            name: module.name().to_string(),
            module,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn start(&self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        self.module.start(ctx).await
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Result of one module invocation.
#[derive(Debug)]
pub struct ModuleOutcome {
    pub name: String,
    pub result: Result<(), ModuleError>,
    pub duration_ms: u64,
}

/// Runs registered modules, isolating their failures from each other.
#[derive(Debug, Default, Clone)]
pub struct ModuleRunner {
    modules: Vec<ModuleHandle>,
    debug: bool,
}

impl ModuleRunner {
    pub fn new(debug: bool) -> Self {
        Self {
            modules: Vec::new(),
            debug,
        }
    }

    pub fn register(&mut self, module: ModuleHandle) {
        tracing::debug!("Registered module '{}'", module.name());
        self.modules.push(module);
    }

    pub fn with_module(mut self, module: ModuleHandle) -> Self {
        self.register(module);
        self
    }

    pub fn modules(&self) -> &[ModuleHandle] {
        &self.modules
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Start every module concurrently and wait for all of them.
    ///
    /// Errors and panics are captured per module; one failing module never
    /// prevents the others from running.
    pub async fn run(&self, changes: ChangeSummary) -> Vec<ModuleOutcome> {
        let ctx = ModuleContext {
            debug: self.debug,
            changes,
        };

        let runs = self.modules.iter().map(|module| {
            let ctx = &ctx;
            async move {
                let started = Instant::now();
                let result = match AssertUnwindSafe(module.start(ctx)).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => Err(ModuleError::Panicked {
                        module: module.name().to_string(),
                        message: panic_message(payload),
                    }),
                };
                ModuleOutcome {
                    name: module.name().to_string(),
                    result,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        });

        join_all(runs).await
    }
}

#[async_trait]
impl UpdateHook for ModuleRunner {
    async fn on_update(&self, update: &Update<'_>) {
        if !update.changes.static_folders || self.modules.is_empty() {
            return;
        }

        for outcome in self.run(update.changes).await {
            match outcome.result {
                Ok(()) => tracing::info!(
                    "Module '{}' finished in {}ms",
                    outcome.name,
                    outcome.duration_ms
                ),
                Err(err) => tracing::error!("{}", err),
            }
        }
    }
}
