//! Ownership of the single live-reload server instance.
//!
//! ```text
//! Stopped --start--> Starting --bound--> Running --stop/restart--> Stopping --port free--> Stopped
//!    ^                  |
//!    `---bind failed----'
//! ```
//!
//! All transitions are serialized behind one async lock, so a `stop` is
//! always fully complete (port confirmed free) before the next `start`
//! proceeds. `restart` is exactly `stop` followed by `start` under that same
//! lock and never binds while the previous listener might still hold the
//! port.
//!
//! Port release is confirmed by retry-binding the old address with
//! `SO_REUSEADDR` until it succeeds or the stop timeout elapses.

use crate::error::LifecycleError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpSocket;
use tokio::sync::watch;
use tokio::time::Instant;

/// Lifecycle state of the dev server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Settings for one server start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on
    pub addr: SocketAddr,
    /// Upper bound on waiting for the port to be released on stop
    pub stop_timeout: Duration,
    /// Delay between port release probes
    pub poll_interval: Duration,
}

impl ServerConfig {
    pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            stop_timeout: Self::DEFAULT_STOP_TIMEOUT,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

/// Identity of one bound server generation.
///
/// Two handles compare equal only if they refer to the same listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHandle {
    addr: SocketAddr,
    generation: u64,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Incremented on every successful bind.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Factory for concrete live-reload servers (the HTTP implementation lives
/// in the CLI crate).
#[async_trait]
pub trait ServerBackend: Send + Sync {
    /// Bind `addr` and start serving.
    async fn listen(&self, addr: SocketAddr) -> Result<Arc<dyn ServerInstance>, LifecycleError>;
}

/// A bound, serving live-reload server.
#[async_trait]
pub trait ServerInstance: Send + Sync {
    /// Address actually bound (resolves port 0).
    fn local_addr(&self) -> SocketAddr;

    /// Tell connected browsers that `paths` changed.
    fn reload(&self, paths: &[PathBuf]) -> Result<(), LifecycleError>;

    /// Stop serving and drop the listener.
    async fn close(&self);
}

struct Shared {
    state: ServerState,
    instance: Option<Arc<dyn ServerInstance>>,
    handle: Option<ServerHandle>,
    config: Option<ServerConfig>,
    /// Reload requests received while not running
    queued: BTreeSet<PathBuf>,
    generation: u64,
}

/// Owns the dev server and the port it listens on.
pub struct DevServerLifecycle {
    backend: Arc<dyn ServerBackend>,
    /// Serializes start/stop/restart
    transition: tokio::sync::Mutex<()>,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<ServerState>,
}

impl DevServerLifecycle {
    pub fn new(backend: Arc<dyn ServerBackend>) -> Self {
        let (state_tx, _) = watch::channel(ServerState::Stopped);
        Self {
            backend,
            transition: tokio::sync::Mutex::new(()),
            shared: Mutex::new(Shared {
                state: ServerState::Stopped,
                instance: None,
                handle: None,
                config: None,
                queued: BTreeSet::new(),
                generation: 0,
            }),
            state_tx,
        }
    }

    pub fn state(&self) -> ServerState {
        self.shared.lock().state
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state_tx.subscribe()
    }

    /// Handle of the running server, if any.
    pub fn handle(&self) -> Option<ServerHandle> {
        self.shared.lock().handle.clone()
    }

    /// Start the server. Idempotent: while running, returns the existing
    /// handle without rebinding.
    ///
    /// On bind failure the state returns to `Stopped` and the error is
    /// surfaced; nothing is retried.
    pub async fn start(&self, config: &ServerConfig) -> Result<ServerHandle, LifecycleError> {
        let _transition = self.transition.lock().await;
        self.start_locked(config).await
    }

    /// Stop the server and wait until its port is free again.
    ///
    /// A no-op while stopped. Fails with
    /// [`LifecycleError::PortNotReleased`] if the port is still held after
    /// the configured timeout; the state is `Stopped` either way.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let _transition = self.transition.lock().await;
        self.stop_locked().await
    }

    /// Stop (awaited to completion), then start with `config`.
    pub async fn restart(&self, config: &ServerConfig) -> Result<ServerHandle, LifecycleError> {
        let _transition = self.transition.lock().await;
        self.stop_locked().await?;
        self.start_locked(config).await
    }

    /// Push a reload to connected browsers.
    ///
    /// While the server is not running the paths are queued and replayed as
    /// soon as it reaches `Running`.
    pub fn reload(&self, paths: &[PathBuf]) -> Result<(), LifecycleError> {
        let instance = {
            let mut shared = self.shared.lock();
            let running = match (shared.state, shared.instance.as_ref()) {
                (ServerState::Running, Some(instance)) => Some(Arc::clone(instance)),
                _ => None,
            };
            match running {
                Some(instance) => instance,
                None => {
                    tracing::debug!(
                        "Dev server is {:?}, queueing reload of {} path(s)",
                        shared.state,
                        paths.len()
                    );
                    shared.queued.extend(paths.iter().cloned());
                    return Ok(());
                }
            }
        };

        instance.reload(paths)
    }

    async fn start_locked(&self, config: &ServerConfig) -> Result<ServerHandle, LifecycleError> {
        {
            let mut shared = self.shared.lock();
            if let Some(handle) = &shared.handle {
                tracing::debug!("Dev server already running at {}", handle.addr);
                return Ok(handle.clone());
            }
            self.set_state(&mut shared, ServerState::Starting);
        }

        let instance = match self.backend.listen(config.addr).await {
            Ok(instance) => instance,
            Err(err) => {
                self.set_state(&mut self.shared.lock(), ServerState::Stopped);
                return Err(err);
            }
        };

        let (handle, queued) = {
            let mut shared = self.shared.lock();
            shared.generation += 1;
            let handle = ServerHandle {
                addr: instance.local_addr(),
                generation: shared.generation,
            };
            shared.instance = Some(Arc::clone(&instance));
            shared.handle = Some(handle.clone());
            shared.config = Some(config.clone());
            self.set_state(&mut shared, ServerState::Running);
            (handle, std::mem::take(&mut shared.queued))
        };

        tracing::info!(
            "Dev server listening on {} (generation {})",
            handle.addr,
            handle.generation
        );

        if !queued.is_empty() {
            let queued: Vec<PathBuf> = queued.into_iter().collect();
            tracing::debug!("Replaying {} queued reload path(s)", queued.len());
            if let Err(err) = instance.reload(&queued) {
                tracing::warn!("Failed to replay queued reload: {}", err);
            }
        }

        Ok(handle)
    }

    async fn stop_locked(&self) -> Result<(), LifecycleError> {
        let (instance, config) = {
            let mut shared = self.shared.lock();
            if shared.state == ServerState::Stopped {
                return Ok(());
            }
            self.set_state(&mut shared, ServerState::Stopping);
            shared.handle = None;
            (shared.instance.take(), shared.config.clone())
        };

        let result = match (instance, config) {
            (Some(instance), Some(config)) => {
                let addr = instance.local_addr();
                instance.close().await;
                drop(instance);
                wait_for_port_release(addr, config.stop_timeout, config.poll_interval).await
            }
            _ => Ok(()),
        };

        self.set_state(&mut self.shared.lock(), ServerState::Stopped);

        match &result {
            Ok(()) => tracing::info!("Dev server stopped"),
            Err(err) => tracing::error!("Dev server stop incomplete: {}", err),
        }
        result
    }

    fn set_state(&self, shared: &mut Shared, state: ServerState) {
        tracing::trace!("Dev server state {:?} -> {:?}", shared.state, state);
        shared.state = state;
        self.state_tx.send_replace(state);
    }
}

/// Poll until `addr` can be bound again, or fail after `timeout`.
///
/// Probes with `SO_REUSEADDR` so sockets lingering in `TIME_WAIT` do not
/// count as held; a listener that is still open does.
pub async fn wait_for_port_release(
    addr: SocketAddr,
    timeout: Duration,
    interval: Duration,
) -> Result<(), LifecycleError> {
    let deadline = Instant::now() + timeout;

    loop {
        match probe_bind(addr) {
            Ok(()) => return Ok(()),
            Err(err) if Instant::now() >= deadline => {
                tracing::debug!("Port {} still held after timeout: {}", addr.port(), err);
                return Err(LifecycleError::PortNotReleased {
                    addr,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            Err(err) => {
                tracing::trace!("Port {} not yet released: {}", addr.port(), err);
                tokio::time::sleep(interval).await;
            }
        }
    }
}

fn probe_bind(addr: SocketAddr) -> std::io::Result<()> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    // Dropped immediately: the probe only has to prove the bind succeeds
    let _listener = socket.listen(1)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that records binds without touching the network.
    #[derive(Default)]
    struct FakeBackend {
        binds: AtomicUsize,
        fail: bool,
        reloads: Arc<Mutex<Vec<PathBuf>>>,
    }

    struct FakeInstance {
        reloads: Arc<Mutex<Vec<PathBuf>>>,
    }

    #[async_trait]
    impl ServerBackend for FakeBackend {
        async fn listen(
            &self,
            addr: SocketAddr,
        ) -> Result<Arc<dyn ServerInstance>, LifecycleError> {
            if self.fail {
                return Err(LifecycleError::Bind {
                    addr,
                    source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
                });
            }
            self.binds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeInstance {
                reloads: Arc::clone(&self.reloads),
            }))
        }
    }

    #[async_trait]
    impl ServerInstance for FakeInstance {
        fn local_addr(&self) -> SocketAddr {
            // Port 0 always probes as free
            "127.0.0.1:0".parse().unwrap()
        }

        fn reload(&self, paths: &[PathBuf]) -> Result<(), LifecycleError> {
            self.reloads.lock().extend(paths.iter().cloned());
            Ok(())
        }

        async fn close(&self) {}
    }

    fn config() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0".parse().unwrap())
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let backend = Arc::new(FakeBackend::default());
        let lifecycle = DevServerLifecycle::new(backend.clone());

        let first = lifecycle.start(&config()).await.unwrap();
        let second = lifecycle.start(&config()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.binds.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state(), ServerState::Running);
    }

    #[tokio::test]
    async fn test_stop_twice_is_noop() {
        let lifecycle = DevServerLifecycle::new(Arc::new(FakeBackend::default()));

        lifecycle.stop().await.unwrap();
        lifecycle.start(&config()).await.unwrap();
        lifecycle.stop().await.unwrap();
        assert_eq!(lifecycle.state(), ServerState::Stopped);
        lifecycle.stop().await.unwrap();
        assert_eq!(lifecycle.state(), ServerState::Stopped);
        assert!(lifecycle.handle().is_none());
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_stopped() {
        let backend = Arc::new(FakeBackend {
            fail: true,
            ..FakeBackend::default()
        });
        let lifecycle = DevServerLifecycle::new(backend);

        let err = lifecycle.start(&config()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Bind { .. }));
        assert_eq!(lifecycle.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_yields_new_generation() {
        let backend = Arc::new(FakeBackend::default());
        let lifecycle = DevServerLifecycle::new(backend.clone());

        let first = lifecycle.start(&config()).await.unwrap();
        let second = lifecycle.restart(&config()).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(second.generation(), first.generation() + 1);
        assert_eq!(backend.binds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reload_queued_until_running() {
        let backend = Arc::new(FakeBackend::default());
        let lifecycle = DevServerLifecycle::new(backend.clone());

        lifecycle
            .reload(&[PathBuf::from("dist/index.html")])
            .unwrap();
        lifecycle
            .reload(&[PathBuf::from("dist/index.html"), PathBuf::from("dist/app.css")])
            .unwrap();
        assert!(backend.reloads.lock().is_empty());

        lifecycle.start(&config()).await.unwrap();

        let replayed = backend.reloads.lock().clone();
        assert_eq!(
            replayed,
            vec![PathBuf::from("dist/app.css"), PathBuf::from("dist/index.html")]
        );

        lifecycle.reload(&[PathBuf::from("dist/app.js")]).unwrap();
        assert_eq!(backend.reloads.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_state_transitions_are_observable() {
        let lifecycle = DevServerLifecycle::new(Arc::new(FakeBackend::default()));
        let mut rx = lifecycle.subscribe();
        assert_eq!(*rx.borrow(), ServerState::Stopped);

        lifecycle.start(&config()).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ServerState::Running);
    }

    #[tokio::test]
    async fn test_port_release_times_out_while_held() {
        let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = held.local_addr().unwrap();

        let err = wait_for_port_release(addr, Duration::from_millis(100), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::PortNotReleased { .. }));

        drop(held);
        wait_for_port_release(addr, Duration::from_secs(2), Duration::from_millis(10))
            .await
            .unwrap();
    }
}
