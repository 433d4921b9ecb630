//! Watch events through the dev loop into the orchestrator.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kiln_cli::commands::dev::DevLoop;
use kiln_cli::dev::FileChange;
use kiln_cli::scan::IgnoreRules;
use kiln_core::{
    BuildOrchestrator, BuildStep, BuildStepError, BuildStepRegistry, Category, SourceRootMap,
};
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

/// Forwards every invocation to the test.
struct Recorder(mpsc::UnboundedSender<(Category, BTreeSet<PathBuf>)>);

#[async_trait]
impl BuildStep for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn run(
        &self,
        category: Category,
        changed: &BTreeSet<PathBuf>,
    ) -> Result<(), BuildStepError> {
        let _ = self.0.send((category, changed.clone()));
        Ok(())
    }
}

#[tokio::test]
async fn burst_of_saves_becomes_one_batch() {
    let dir = TempDir::new().unwrap();
    let pug = dir.path().join("src/pug");
    let scss = dir.path().join("src/scss");
    let roots = SourceRootMap::builder()
        .root(Category::Template, &pug)
        .root(Category::Style, &scss)
        .build();

    let (runs_tx, mut runs) = mpsc::unbounded_channel();
    let mut registry = BuildStepRegistry::new();
    registry.register(Category::Template, Arc::new(Recorder(runs_tx.clone())));
    registry.register(Category::Style, Arc::new(Recorder(runs_tx)));
    let orchestrator = Arc::new(BuildOrchestrator::new(Arc::new(registry)));

    let (events_tx, events) = mpsc::channel(16);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut dev = DevLoop::new(roots, IgnoreRules::default(), Duration::from_millis(100));
    let running = tokio::spawn(async move {
        dev.run(events, orchestrator, async {
            let _ = stop_rx.await;
        })
        .await;
    });

    let index = pug.join("index.pug");
    let site = scss.join("site.scss");
    for change in [
        FileChange::Modified(index.clone()),
        FileChange::Modified(site.clone()),
        FileChange::Modified(index.clone()),
        FileChange::Modified(dir.path().join("package.json")),
        FileChange::Modified(pug.join(".index.pug.swp")),
    ] {
        events_tx.send(change).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut seen = Vec::new();
    for _ in 0..2 {
        let run = timeout(Duration::from_secs(5), runs.recv())
            .await
            .expect("step never ran")
            .unwrap();
        seen.push(run);
    }
    seen.sort();
    assert_eq!(
        seen,
        vec![
            (Category::Template, BTreeSet::from([index])),
            (Category::Style, BTreeSet::from([site])),
        ]
    );

    // Nothing else was batched
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(runs.try_recv().is_err());

    stop_tx.send(()).unwrap();
    timeout(Duration::from_secs(5), running).await.unwrap().unwrap();
}

#[tokio::test]
async fn closed_watcher_ends_the_loop() {
    let roots = SourceRootMap::builder()
        .root(Category::Script, "/site/src/js")
        .build();
    let orchestrator = Arc::new(BuildOrchestrator::new(Arc::new(BuildStepRegistry::new())));
    let (events_tx, events) = mpsc::channel::<FileChange>(1);
    drop(events_tx);

    let mut dev = DevLoop::new(roots, IgnoreRules::default(), Duration::from_millis(50));
    timeout(
        Duration::from_secs(1),
        dev.run(events, orchestrator, std::future::pending()),
    )
    .await
    .expect("loop should stop when the watcher is gone");
}
