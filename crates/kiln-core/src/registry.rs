//! Per-category compiler steps.
//!
//! The registry knows nothing about pug, sass or bundlers. A [`BuildStep`]
//! is an opaque async operation that may fail; the registry decides which
//! steps a [`ChangeSet`] needs and runs them side by side.

use crate::category::Category;
use crate::changes::ChangeSet;
use crate::error::{panic_message, BuildStepError};
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Delegate to the external compiler responsible for one category.
#[async_trait]
pub trait BuildStep: Send + Sync {
    /// Short label for logs (e.g. the compiler command).
    fn name(&self) -> &str;

    /// Compile after `changed` paths of `category` were modified.
    async fn run(&self, category: Category, changed: &BTreeSet<PathBuf>)
        -> Result<(), BuildStepError>;
}

/// Outcome of one step invocation, retained for the current batch only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStepResult {
    pub category: Category,
    pub succeeded: bool,
    pub error: Option<BuildStepError>,
    pub duration_ms: u64,
}

impl BuildStepResult {
    pub fn failed(&self) -> bool {
        !self.succeeded
    }
}

struct RegisteredStep {
    step: Arc<dyn BuildStep>,
    /// Held for the duration of a run so one category never overlaps itself
    in_flight: Mutex<()>,
}

/// Maps each category to the step that compiles it.
#[derive(Default)]
pub struct BuildStepRegistry {
    steps: IndexMap<Category, RegisteredStep>,
}

impl BuildStepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the step for `category`.
    pub fn register(&mut self, category: Category, step: Arc<dyn BuildStep>) {
        tracing::debug!("Registered {} step: {}", category, step.name());
        self.steps.insert(
            category,
            RegisteredStep {
                step,
                in_flight: Mutex::new(()),
            },
        );
    }

    /// Whether a step is registered for `category`.
    pub fn has_step(&self, category: Category) -> bool {
        self.steps.contains_key(&category)
    }

    /// Categories with a registered step, in registration order.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.steps.keys().copied()
    }

    /// Run the step of every category present in `changes`.
    ///
    /// Categories without changes are skipped. Steps of different categories
    /// run concurrently and a failing step never aborts its siblings; each
    /// outcome is reported in its own [`BuildStepResult`], in category order.
    pub async fn run_for(&self, changes: &ChangeSet) -> Vec<BuildStepResult> {
        let runs = changes.categories().filter_map(|category| {
            let Some(registered) = self.steps.get(&category) else {
                tracing::debug!("No {} step registered, skipping", category);
                return None;
            };
            Some(Self::run_step(category, registered, changes.paths(category)))
        });

        join_all(runs).await
    }

    async fn run_step(
        category: Category,
        registered: &RegisteredStep,
        changed: &BTreeSet<PathBuf>,
    ) -> BuildStepResult {
        let _in_flight = registered.in_flight.lock().await;

        tracing::debug!(
            "Running {} step '{}' for {} file(s)",
            category,
            registered.step.name(),
            changed.len()
        );

        let started = Instant::now();
        let outcome = AssertUnwindSafe(registered.step.run(category, changed))
            .catch_unwind()
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(payload) => Some(BuildStepError::Panicked {
                category,
                message: panic_message(payload),
            }),
        };

        BuildStepResult {
            category,
            succeeded: error.is_none(),
            error,
            duration_ms,
        }
    }
}
