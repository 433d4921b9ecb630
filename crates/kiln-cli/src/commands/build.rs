//! One-shot build of every category.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kiln_core::{
    BuildOrchestrator, BuildStepRegistry, Category, ChangeSet, ChangeSummary, ModuleRunner,
};

use crate::error::{BuildError, Result, ResultExt};
use crate::project::Project;
use crate::scan;
use crate::ui;

/// What a full build did.
#[derive(Debug, Default)]
pub struct BuildOutcome {
    /// Source files found under the configured roots
    pub files: usize,
    pub failed_steps: Vec<Category>,
    pub failed_modules: Vec<String>,
    pub duration: Duration,
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        self.failed_steps.is_empty() && self.failed_modules.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if !self.failed_steps.is_empty() {
            return Err(BuildError::StepsFailed(self.failed_steps).into());
        }
        if !self.failed_modules.is_empty() {
            return Err(BuildError::ModulesFailed(self.failed_modules).into());
        }
        Ok(())
    }
}

/// Compile every category from its full source tree, then run every module.
///
/// Steps and modules are isolated from each other: everything runs, and the
/// failures are collected in the outcome.
pub async fn build_all(
    project: &Project,
    registry: Arc<BuildStepRegistry>,
    modules: &ModuleRunner,
) -> BuildOutcome {
    let started = Instant::now();
    let roots = project.roots();

    let mut changes = ChangeSet::new();
    for (category, path) in scan::scan_all(&roots, &project.ignore_rules()) {
        changes.insert(category, path);
    }

    let mut outcome = BuildOutcome {
        files: changes.len(),
        ..BuildOutcome::default()
    };
    tracing::debug!("Full build over {} file(s)", outcome.files);

    let orchestrator = BuildOrchestrator::new(registry);
    for report in orchestrator.on_change(changes).await.reports() {
        ui::print_batch_summary(report);
        outcome
            .failed_steps
            .extend(report.failures().map(|result| result.category));
    }

    for module in modules.run(ChangeSummary::all()).await {
        if !ui::module_outcome(&module) {
            outcome.failed_modules.push(module.name);
        }
    }

    outcome.duration = started.elapsed();
    outcome
}

pub async fn execute(project: Project) -> Result<()> {
    if project.config.production {
        ui::info("Building for production");
    }

    let dist = project.dist();
    std::fs::create_dir_all(&dist).with_path(&dist)?;

    let registry = Arc::new(project.registry());
    let outcome = build_all(&project, registry, &project.modules()).await;

    if outcome.is_success() {
        ui::success(&format!(
            "Built {} file(s) into {} in {}",
            outcome.files,
            dist.display(),
            ui::format_duration(outcome.duration)
        ));
    }

    outcome.into_result()
}
