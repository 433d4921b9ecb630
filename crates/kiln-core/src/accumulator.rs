//! Debounce window collecting classified paths into one [`ChangeSet`].
//!
//! Every [`record`](ChangeAccumulator::record) pushes the deadline back by a
//! full window. A batch is only released once the window has elapsed with no
//! further activity, so a save-all across many files yields a single rebuild.
//!
//! Time comes from `tokio::time`, which lets tests drive the window with a
//! paused clock.

use crate::category::Category;
use crate::changes::ChangeSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

/// Collects classified paths until the debounce window settles.
#[derive(Debug)]
pub struct ChangeAccumulator {
    window: Duration,
    pending: ChangeSet,
    last_record: Option<Instant>,
}

impl ChangeAccumulator {
    /// Default quiet period before a batch is considered settled.
    pub const DEFAULT_WINDOW: Duration = Duration::from_millis(200);

    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: ChangeSet::new(),
            last_record: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Merge a classified path into the in-progress batch and restart the
    /// window. Returns `false` if the path was already pending.
    pub fn record(&mut self, path: impl Into<PathBuf>, category: Category) -> bool {
        self.last_record = Some(Instant::now());
        self.pending.insert(category, path)
    }

    /// Instant at which the pending batch settles, if anything is pending.
    pub fn deadline(&self) -> Option<Instant> {
        if self.pending.is_empty() {
            return None;
        }
        self.last_record.map(|last| last + self.window)
    }

    /// Whether a non-empty batch has been quiet for a full window.
    pub fn is_settled(&self) -> bool {
        self.deadline()
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Hand over the pending batch if it has settled.
    ///
    /// Never returns a partial batch: before the window elapses this is
    /// `None` and the pending paths stay where they are.
    pub fn flush_if_settled(&mut self) -> Option<ChangeSet> {
        if !self.is_settled() {
            return None;
        }
        self.last_record = None;
        Some(std::mem::take(&mut self.pending))
    }

    /// Paths recorded since the last flush.
    pub fn pending(&self) -> &ChangeSet {
        &self.pending
    }
}

impl Default for ChangeAccumulator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}
