//! Kiln core - the incremental build orchestrator.
//!
//! Raw filesystem changes flow through this crate in one direction:
//!
//! ```text
//! watcher -> classify -> ChangeAccumulator -> BuildOrchestrator
//!                                                 |-> BuildStepRegistry (compile)
//!                                                 |-> DevServerLifecycle (reload)
//!                                                 `-> UpdateHook (modules)
//! ```
//!
//! - [`classifier`] maps a changed path to at most one [`Category`]
//! - [`accumulator`] debounces classified paths into a single [`ChangeSet`]
//! - [`registry`] runs the external compiler step of every touched category
//! - [`lifecycle`] owns the one live-reload server and its listening port
//! - [`orchestrator`] serializes batches and drives the steps above
//! - [`hooks`] is the contract pluggable modules implement
//!
//! The concrete HTTP server, the watcher and the compiler invocations live in
//! `kiln-cli`; this crate only depends on them through traits.

pub mod accumulator;
pub mod category;
pub mod changes;
pub mod classifier;
pub mod error;
pub mod hooks;
pub mod lifecycle;
pub mod orchestrator;
pub mod registry;

pub use accumulator::ChangeAccumulator;
pub use category::Category;
pub use changes::{ChangeSet, ChangeSummary};
pub use classifier::{classify, try_classify, SourceRootMap, SourceRootMapBuilder};
pub use error::{BuildStepError, ClassificationError, LifecycleError, ModuleError};
pub use hooks::{
    Module, ModuleContext, ModuleHandle, ModuleOutcome, ModuleRunner, NoopHook, Update,
    UpdateHook,
};
pub use lifecycle::{
    wait_for_port_release, DevServerLifecycle, ServerBackend, ServerConfig, ServerHandle,
    ServerInstance, ServerState,
};
pub use orchestrator::{BatchReport, BuildOrchestrator, Dispatch, OrchestratorPhase};
pub use registry::{BuildStep, BuildStepRegistry, BuildStepResult};
