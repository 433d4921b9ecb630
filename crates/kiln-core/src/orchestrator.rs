//! Batch driver tying the registry, the dev server and the update hook
//! together.
//!
//! ```text
//! Idle -> Building -> NotifyingHook -> Idle
//! ```
//!
//! Batches are processed strictly one after another. A batch that arrives
//! while another is in flight is merged into a single pending batch, so the
//! backlog never grows beyond one. Whoever currently drives the loop also
//! drains that pending batch before returning.

use crate::category::Category;
use crate::changes::{ChangeSet, ChangeSummary};
use crate::error::{panic_message, LifecycleError};
use crate::hooks::{NoopHook, Update, UpdateHook};
use crate::lifecycle::{DevServerLifecycle, ServerState};
use crate::registry::{BuildStepRegistry, BuildStepResult};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Where the orchestrator currently is within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrchestratorPhase {
    Idle,
    Building,
    NotifyingHook,
}

/// What happened to a batch passed to [`BuildOrchestrator::on_change`].
#[derive(Debug)]
pub enum Dispatch {
    /// This call drove the loop; one report per processed batch, including
    /// batches queued by other callers meanwhile
    Processed(Vec<BatchReport>),
    /// Another call is driving the loop and will pick the batch up
    Queued,
    /// The batch was empty
    Ignored,
}

impl Dispatch {
    pub fn reports(&self) -> &[BatchReport] {
        match self {
            Dispatch::Processed(reports) => reports,
            Dispatch::Queued | Dispatch::Ignored => &[],
        }
    }
}

/// Summary of one processed batch.
#[derive(Debug)]
pub struct BatchReport {
    pub changes: ChangeSummary,
    pub results: Vec<BuildStepResult>,
    /// Paths handed to the dev server for reload
    pub reloaded: Vec<PathBuf>,
    /// Reload failure, if the server could not be signalled
    pub reload_error: Option<LifecycleError>,
    pub duration_ms: u64,
}

impl BatchReport {
    /// Results of steps that failed.
    pub fn failures(&self) -> impl Iterator<Item = &BuildStepResult> {
        self.results.iter().filter(|result| result.failed())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none() && self.reload_error.is_none()
    }
}

/// Single entry point for settled change batches.
pub struct BuildOrchestrator {
    registry: Arc<BuildStepRegistry>,
    lifecycle: Option<Arc<DevServerLifecycle>>,
    hook: Arc<dyn UpdateHook>,
    /// At most one batch waiting behind the one in flight
    pending: Mutex<Option<ChangeSet>>,
    /// Held by whichever call is processing batches
    driver: tokio::sync::Mutex<()>,
    phase: Mutex<OrchestratorPhase>,
}

impl BuildOrchestrator {
    pub fn new(registry: Arc<BuildStepRegistry>) -> Self {
        Self {
            registry,
            lifecycle: None,
            hook: Arc::new(NoopHook),
            pending: Mutex::new(None),
            driver: tokio::sync::Mutex::new(()),
            phase: Mutex::new(OrchestratorPhase::Idle),
        }
    }

    /// Reload this server after every batch.
    pub fn with_lifecycle(mut self, lifecycle: Arc<DevServerLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Install the `onUpdate` hook.
    pub fn with_hook(mut self, hook: Arc<dyn UpdateHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn phase(&self) -> OrchestratorPhase {
        *self.phase.lock()
    }

    /// Whether a batch is waiting behind the one in flight.
    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Hand a settled batch to the orchestrator.
    ///
    /// If no batch is in flight, this call processes it (and anything queued
    /// meanwhile) before returning. Otherwise the batch is merged into the
    /// pending one and the call returns [`Dispatch::Queued`] immediately.
    pub async fn on_change(&self, changes: ChangeSet) -> Dispatch {
        if changes.is_empty() {
            return Dispatch::Ignored;
        }

        {
            let mut pending = self.pending.lock();
            match pending.as_mut() {
                Some(queued) => queued.merge(changes),
                None => *pending = Some(changes),
            }
        }

        let mut reports = Vec::new();
        loop {
            let Ok(_driver) = self.driver.try_lock() else {
                tracing::debug!("Batch in flight, change set queued");
                break;
            };

            loop {
                let next = self.pending.lock().take();
                match next {
                    Some(batch) => reports.push(self.process(batch).await),
                    None => break,
                }
            }
            drop(_driver);

            // A batch queued between the last drain and releasing the driver
            // would otherwise be stranded
            if !self.has_pending() {
                break;
            }
        }

        if reports.is_empty() {
            Dispatch::Queued
        } else {
            Dispatch::Processed(reports)
        }
    }

    async fn process(&self, batch: ChangeSet) -> BatchReport {
        let started = Instant::now();
        let changes = batch.summary();
        tracing::debug!("Processing batch of {} path(s): {:?}", batch.len(), changes);

        self.set_phase(OrchestratorPhase::Building);
        let results = self.registry.run_for(&batch).await;

        for result in &results {
            match &result.error {
                None => tracing::info!(
                    "Rebuilt {} in {}ms",
                    result.category,
                    result.duration_ms
                ),
                Some(err) => {
                    tracing::error!("{}", err);
                    if let Some(diagnostics) = err.diagnostics() {
                        tracing::error!("{}", diagnostics.trim_end());
                    }
                }
            }
        }

        let (reloaded, reload_error) = self.reload(&batch, &results);

        self.set_phase(OrchestratorPhase::NotifyingHook);
        let update = Update::new(&batch, &results);
        if let Err(payload) = AssertUnwindSafe(self.hook.on_update(&update))
            .catch_unwind()
            .await
        {
            tracing::error!("Update hook panicked: {}", panic_message(payload));
        }

        self.set_phase(OrchestratorPhase::Idle);

        BatchReport {
            changes,
            results,
            reloaded,
            reload_error,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Reload the paths of every category that did not fail.
    fn reload(
        &self,
        batch: &ChangeSet,
        results: &[BuildStepResult],
    ) -> (Vec<PathBuf>, Option<LifecycleError>) {
        let Some(lifecycle) = &self.lifecycle else {
            return (Vec::new(), None);
        };
        if lifecycle.state() != ServerState::Running {
            tracing::debug!("Dev server not running, skipping reload");
            return (Vec::new(), None);
        }

        let failed = |category: Category| {
            results
                .iter()
                .any(|result| result.category == category && result.failed())
        };
        let paths: Vec<PathBuf> = batch
            .categories()
            .filter(|category| !failed(*category))
            .flat_map(|category| batch.paths(category).iter().cloned())
            .collect();

        if paths.is_empty() {
            return (paths, None);
        }

        match lifecycle.reload(&paths) {
            Ok(()) => (paths, None),
            Err(err) => {
                tracing::error!("{}", err);
                (Vec::new(), Some(err))
            }
        }
    }

    fn set_phase(&self, phase: OrchestratorPhase) {
        *self.phase.lock() = phase;
    }
}
