//! End-to-end behaviour of classify -> accumulate -> orchestrate -> hook.

use async_trait::async_trait;
use kiln_core::{
    classify, BuildOrchestrator, BuildStep, BuildStepError, BuildStepRegistry, Category,
    ChangeAccumulator, ChangeSet, Dispatch, Module, ModuleContext, ModuleError, ModuleHandle,
    ModuleRunner, SourceRootMap, Update, UpdateHook,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

type Log = Arc<Mutex<Vec<String>>>;

/// Step that logs its start and end.
struct LoggingStep {
    log: Log,
    delay: Duration,
}

#[async_trait]
impl BuildStep for LoggingStep {
    fn name(&self) -> &str {
        "logging"
    }

    async fn run(&self, category: Category, changed: &BTreeSet<PathBuf>) -> Result<(), BuildStepError> {
        let files: Vec<String> = changed.iter().map(|p| p.display().to_string()).collect();
        self.log
            .lock()
            .push(format!("step:start:{}:{}", category, files.join(",")));
        tokio::time::sleep(self.delay).await;
        self.log.lock().push(format!("step:end:{category}"));
        Ok(())
    }
}

/// Hook that logs its start and end, and takes a while.
struct LoggingHook {
    log: Log,
    calls: AtomicUsize,
}

#[async_trait]
impl UpdateHook for LoggingHook {
    async fn on_update(&self, update: &Update<'_>) {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(format!("hook:start:{n}"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(update.results.iter().all(|result| result.succeeded));
        self.log.lock().push(format!("hook:end:{n}"));
    }
}

fn script_batch(path: &str) -> ChangeSet {
    let mut changes = ChangeSet::new();
    changes.insert(Category::Script, path);
    changes
}

#[tokio::test]
async fn batches_are_serialized_through_the_hook() {
    let log: Log = Arc::default();

    let mut registry = BuildStepRegistry::new();
    registry.register(
        Category::Script,
        Arc::new(LoggingStep {
            log: Arc::clone(&log),
            delay: Duration::from_millis(20),
        }),
    );
    let hook = Arc::new(LoggingHook {
        log: Arc::clone(&log),
        calls: AtomicUsize::new(0),
    });
    let orchestrator =
        Arc::new(BuildOrchestrator::new(Arc::new(registry)).with_hook(hook.clone()));

    let a = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.on_change(script_batch("src/js/a.js")).await }
    });
    let b = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.on_change(script_batch("src/js/b.js")).await }
    });

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    let processed: usize = [&a, &b].iter().map(|d| d.reports().len()).sum();
    assert_eq!(processed, 2);
    assert_eq!(hook.calls.load(Ordering::SeqCst), 2);

    let log = log.lock().clone();
    assert_eq!(
        log.iter().map(|line| line.split(':').take(2).collect::<Vec<_>>().join(":")).collect::<Vec<_>>(),
        vec![
            "step:start",
            "step:end",
            "hook:start",
            "hook:end",
            "step:start",
            "step:end",
            "hook:start",
            "hook:end",
        ],
        "interleaved log: {log:?}"
    );
}

struct RecordingModule {
    starts: Arc<Mutex<Vec<ModuleContext>>>,
}

#[async_trait]
impl Module for RecordingModule {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        self.starts.lock().push(*ctx);
        Ok(())
    }
}

/// Both steps have to reach the barrier together, which only happens if
/// they run concurrently.
struct RendezvousStep {
    barrier: Arc<Barrier>,
}

#[async_trait]
impl BuildStep for RendezvousStep {
    fn name(&self) -> &str {
        "rendezvous"
    }

    async fn run(&self, _category: Category, _changed: &BTreeSet<PathBuf>) -> Result<(), BuildStepError> {
        self.barrier.wait().await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn template_and_image_saved_together_yield_one_batch() {
    let roots = SourceRootMap::builder()
        .root(Category::Template, "src/pug")
        .root(Category::StaticAsset, "src/images")
        .build();

    let mut acc = ChangeAccumulator::new(Duration::from_millis(200));
    for path in ["src/pug/index.pug", "src/images/logo.png"] {
        let category = classify(Path::new(path), &roots).unwrap();
        acc.record(path, category);
        tokio::time::advance(Duration::from_millis(25)).await;
    }
    assert!(acc.flush_if_settled().is_none());

    tokio::time::advance(Duration::from_millis(200)).await;
    let batch = acc.flush_if_settled().unwrap();
    assert!(acc.flush_if_settled().is_none());

    assert_eq!(
        batch.paths(Category::Template),
        &BTreeSet::from([PathBuf::from("src/pug/index.pug")])
    );
    assert_eq!(
        batch.paths(Category::StaticAsset),
        &BTreeSet::from([PathBuf::from("src/images/logo.png")])
    );

    let barrier = Arc::new(Barrier::new(2));
    let mut registry = BuildStepRegistry::new();
    for category in [Category::Template, Category::StaticAsset] {
        registry.register(
            category,
            Arc::new(RendezvousStep {
                barrier: Arc::clone(&barrier),
            }),
        );
    }

    let starts = Arc::new(Mutex::new(Vec::new()));
    let runner = ModuleRunner::new(false).with_module(ModuleHandle::new(RecordingModule {
        starts: Arc::clone(&starts),
    }));
    let orchestrator = BuildOrchestrator::new(Arc::new(registry)).with_hook(Arc::new(runner));

    let dispatch = tokio::time::timeout(Duration::from_secs(5), orchestrator.on_change(batch))
        .await
        .expect("steps must run concurrently");

    let Dispatch::Processed(reports) = dispatch else {
        panic!("expected the batch to be processed");
    };
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].results.len(), 2);
    assert!(reports[0].changes.template);
    assert!(reports[0].changes.static_folders);

    let starts = starts.lock();
    assert_eq!(starts.len(), 1);
    assert!(starts[0].changes.static_folders);
}

#[tokio::test]
async fn failing_step_leaves_siblings_and_hook_intact() {
    struct Broken;

    #[async_trait]
    impl BuildStep for Broken {
        fn name(&self) -> &str {
            "sass"
        }

        async fn run(&self, category: Category, _changed: &BTreeSet<PathBuf>) -> Result<(), BuildStepError> {
            Err(BuildStepError::Failed {
                category,
                message: "exit status 65".to_string(),
                diagnostics: None,
            })
        }
    }

    struct SeenFailures(AtomicUsize);

    #[async_trait]
    impl UpdateHook for SeenFailures {
        async fn on_update(&self, update: &Update<'_>) {
            if update.has_failures() {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    let log: Log = Arc::default();
    let mut registry = BuildStepRegistry::new();
    registry.register(Category::Style, Arc::new(Broken));
    registry.register(
        Category::Script,
        Arc::new(LoggingStep {
            log: Arc::clone(&log),
            delay: Duration::ZERO,
        }),
    );
    let hook = Arc::new(SeenFailures(AtomicUsize::new(0)));
    let orchestrator = BuildOrchestrator::new(Arc::new(registry)).with_hook(hook.clone());

    let mut changes = ChangeSet::new();
    changes.insert(Category::Style, "src/scss/main.scss");
    changes.insert(Category::Script, "src/js/app.js");

    let dispatch = orchestrator.on_change(changes).await;
    let report = &dispatch.reports()[0];

    let script = report
        .results
        .iter()
        .find(|result| result.category == Category::Script)
        .unwrap();
    assert!(script.succeeded);
    assert_eq!(report.failures().count(), 1);
    assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    assert_eq!(log.lock().len(), 2);
}
