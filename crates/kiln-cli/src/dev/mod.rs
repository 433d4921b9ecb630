//! Development mode: the live-reload HTTP server and the filesystem watcher.
//!
//! The server is only ever started, stopped and signalled through
//! `kiln_core::DevServerLifecycle`; this module just provides the backend.

pub mod server;
pub mod watcher;

pub use server::{LiveEvent, LiveReloadBackend, LiveReloadServer};
pub use watcher::{FileChange, FileWatcher};
