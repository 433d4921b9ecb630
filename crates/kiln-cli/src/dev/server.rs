//! Live-reload server: serves `dist` and pushes reload events over
//! Server-Sent Events.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, Uri, header},
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::get,
};
use kiln_core::{LifecycleError, ServerBackend, ServerInstance};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tower_http::cors::{Any, CorsLayer};

pub const SSE_PATH: &str = "/__kiln_sse__";
pub const SCRIPT_PATH: &str = "/__kiln_livereload__.js";

const SCRIPT_TAG: &str = r#"<script src="/__kiln_livereload__.js"></script>"#;
const CLIENT_SCRIPT: &str = include_str!("../../assets/livereload.js");

/// Events pushed to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LiveEvent {
    Connected,
    /// Source paths whose output changed
    Reload { paths: Vec<String> },
    /// The server is going away; the client reconnects on its own
    Shutdown,
}

/// State shared by every request handler of one server.
struct LiveState {
    dist: PathBuf,
    clients: RwLock<HashMap<usize, mpsc::Sender<LiveEvent>>>,
    next_client_id: Mutex<usize>,
}

impl LiveState {
    fn new(dist: PathBuf) -> Self {
        Self {
            dist,
            clients: RwLock::new(HashMap::new()),
            next_client_id: Mutex::new(0),
        }
    }

    fn register_client(&self) -> (usize, mpsc::Receiver<LiveEvent>) {
        let id = {
            let mut next = self.next_client_id.lock();
            let id = *next;
            *next += 1;
            id
        };

        let (tx, rx) = mpsc::channel(16);
        self.clients.write().insert(id, tx);
        (id, rx)
    }

    /// Non-blocking send to every client. Disconnected clients are dropped;
    /// a client whose queue is full misses this event.
    fn broadcast(&self, event: &LiveEvent) -> usize {
        let clients: Vec<_> = self
            .clients
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut gone = Vec::new();
        for (id, tx) in clients {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Live reload client {} is not keeping up", id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(id),
            }
        }

        if !gone.is_empty() {
            let mut registry = self.clients.write();
            for id in gone {
                registry.remove(&id);
            }
        }

        delivered
    }

    fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Drop every sender so open SSE streams end.
    fn disconnect_all(&self) {
        self.clients.write().clear();
    }
}

/// Creates [`LiveReloadServer`]s serving one output directory.
#[derive(Debug, Clone)]
pub struct LiveReloadBackend {
    dist: PathBuf,
    grace: Duration,
}

impl LiveReloadBackend {
    /// How long `close` waits for in-flight requests before aborting.
    pub const DEFAULT_GRACE: Duration = Duration::from_secs(1);

    pub fn new(dist: impl Into<PathBuf>) -> Self {
        Self {
            dist: dist.into(),
            grace: Self::DEFAULT_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

#[async_trait]
impl ServerBackend for LiveReloadBackend {
    async fn listen(&self, addr: SocketAddr) -> Result<Arc<dyn ServerInstance>, LifecycleError> {
        let server = LiveReloadServer::bind(addr, self.dist.clone(), self.grace).await?;
        Ok(Arc::new(server))
    }
}

/// One bound, serving instance.
pub struct LiveReloadServer {
    addr: SocketAddr,
    state: Arc<LiveState>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    grace: Duration,
}

impl LiveReloadServer {
    pub async fn bind(
        addr: SocketAddr,
        dist: PathBuf,
        grace: Duration,
    ) -> Result<Self, LifecycleError> {
        let listener = bind_listener(addr).map_err(|source| LifecycleError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let state = Arc::new(LiveState::new(dist));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let app = router(Arc::clone(&state));

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!("Live reload server error: {}", e);
            }
        });

        tracing::debug!("Live reload server listening on {}", local_addr);
        Ok(Self {
            addr: local_addr,
            state,
            shutdown: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
            grace,
        })
    }

    pub fn client_count(&self) -> usize {
        self.state.client_count()
    }
}

#[async_trait]
impl ServerInstance for LiveReloadServer {
    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    fn reload(&self, paths: &[PathBuf]) -> Result<(), LifecycleError> {
        let event = LiveEvent::Reload {
            paths: paths.iter().map(|p| p.to_string_lossy().into_owned()).collect(),
        };
        let delivered = self.state.broadcast(&event);
        tracing::debug!("Reload sent to {} client(s)", delivered);
        Ok(())
    }

    async fn close(&self) {
        self.state.broadcast(&LiveEvent::Shutdown);
        self.state.disconnect_all();

        let shutdown = self.shutdown.lock().take();
        if let Some(tx) = shutdown {
            let _ = tx.send(());
        }

        let task = self.task.lock().take();
        let Some(mut task) = task else {
            return;
        };

        if tokio::time::timeout(self.grace, &mut task).await.is_err() {
            tracing::warn!(
                "Live reload server did not drain within {}ms, aborting",
                self.grace.as_millis()
            );
            task.abort();
            // Wait for the abort so the listener is dropped before returning
            let _ = task.await;
        }
    }
}

fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    // Lets a restart rebind while old connections sit in TIME_WAIT
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(1024)
}

fn router(state: Arc<LiveState>) -> Router {
    Router::new()
        .route(SSE_PATH, get(handle_sse))
        .route(SCRIPT_PATH, get(handle_script))
        .fallback(handle_request)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn handle_sse(
    State(state): State<Arc<LiveState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, rx) = state.register_client();
    tracing::debug!("Live reload client {} connected", id);

    let stream = tokio_stream::once(LiveEvent::Connected)
        .chain(ReceiverStream::new(rx))
        .map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Ok(Event::default().data(data))
        });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

async fn handle_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        CLIENT_SCRIPT,
    )
}

async fn handle_request(State(state): State<Arc<LiveState>>, uri: Uri) -> Response {
    let Some(relative) = request_path(uri.path()) else {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    };

    let Some(file) = locate(&state.dist, &relative) else {
        return (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain")],
            format!("File not found: {}", uri.path()),
        )
            .into_response();
    };

    match tokio::fs::read(&file).await {
        Ok(content) => {
            let content_type = content_type(&file);
            let body = if content_type.starts_with("text/html") {
                inject_reload_script(&content)
            } else {
                content
            };
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", file.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file").into_response()
        }
    }
}

/// URL path to a path relative to `dist`. `None` if it tries to escape or
/// carries a malformed escape.
fn request_path(path: &str) -> Option<PathBuf> {
    if has_malformed_escape(path) {
        return None;
    }
    let decoded = urlencoding::decode(path).ok()?;
    let mut relative = PathBuf::new();

    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(relative)
}

/// Every `%` must start a two hex digit escape.
fn has_malformed_escape(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.iter().enumerate().any(|(i, &byte)| {
        byte == b'%'
            && !(bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit))
    })
}

/// Directories serve their `index.html`; `/about` falls back to
/// `about.html`.
fn locate(dist: &Path, relative: &Path) -> Option<PathBuf> {
    let candidate = dist.join(relative);

    if candidate.is_dir() {
        let index = candidate.join("index.html");
        return index.is_file().then_some(index);
    }

    if candidate.is_file() {
        return Some(candidate);
    }

    if candidate.extension().is_none() {
        let html = candidate.with_extension("html");
        return html.is_file().then_some(html);
    }

    None
}

/// Insert the client script before the last `</body>`, or append it.
fn inject_reload_script(content: &[u8]) -> Vec<u8> {
    let html = String::from_utf8_lossy(content);

    let mut result = String::with_capacity(html.len() + SCRIPT_TAG.len() + 4);
    match html.rfind("</body>") {
        Some(pos) => {
            result.push_str(&html[..pos]);
            result.push_str(SCRIPT_TAG);
            result.push('\n');
            result.push_str(&html[pos..]);
        }
        None => {
            result.push_str(&html);
            result.push('\n');
            result.push_str(SCRIPT_TAG);
        }
    }
    result.into_bytes()
}

fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
