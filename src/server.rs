//! Static dev server with live reload.
//!
//! Serves the project root read-only over HTTP on the configured port. The
//! port is a fixed contract with the developer's browser: if it is already
//! taken the whole process aborts instead of silently picking another one.
//!
//! Live reload is one-directional, so it rides on SSE rather than a
//! websocket: clients subscribe to `GET /__nacre/reload` and receive a
//! `reload` event carrying a monotonically increasing build generation each
//! time a rebuild completes. `GET /__nacre/client.js` serves a helper
//! script that subscribes and refreshes the page.

use std::convert::Infallible;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::Stream;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

use crate::config::ServerConfig;
use crate::{nlog, nlog_debug, Error, Result};

/// Script served at `/__nacre/client.js`; include it from the page under
/// development to pick up reload events.
const CLIENT_JS: &str = r#"(function () {
  var source = new EventSource("/__nacre/reload");
  source.addEventListener("reload", function () {
    location.reload();
  });
})();
"#;

/// Fan-out point for reload notifications.
///
/// Each completed rebuild bumps the build generation and broadcasts it to
/// every connected SSE client. Send failures mean nobody is listening,
/// which is fine.
#[derive(Debug)]
pub struct ReloadHub {
    tx: broadcast::Sender<u64>,
    generation: AtomicU64,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            generation: AtomicU64::new(0),
        }
    }

    /// Announce a completed rebuild. Returns the new build generation.
    pub fn notify(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let receivers = self.tx.receiver_count();
        nlog_debug!(
            "livereload: generation {} to {} client(s)",
            generation,
            receivers
        );
        let _ = self.tx.send(generation);
        generation
    }

    /// Current build generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// The static file server.
pub struct DevServer {
    port: u16,
    root: PathBuf,
    livereload: bool,
    hub: Arc<ReloadHub>,
}

impl DevServer {
    pub fn new(config: &ServerConfig, project_root: &Path) -> Self {
        Self {
            port: config.port,
            root: config.root_path(project_root),
            livereload: config.livereload,
            hub: Arc::new(ReloadHub::new()),
        }
    }

    /// The reload hub, shared with whoever completes rebuilds.
    pub fn hub(&self) -> Arc<ReloadHub> {
        Arc::clone(&self.hub)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind the listening socket.
    ///
    /// A taken port is [`Error::PortInUse`]; the caller aborts rather than
    /// falling back to another port.
    pub async fn bind(&self) -> Result<TcpListener> {
        match TcpListener::bind(("127.0.0.1", self.port)).await {
            Ok(listener) => Ok(listener),
            Err(e) if e.kind() == ErrorKind::AddrInUse => Err(Error::PortInUse(self.port)),
            Err(e) => Err(e.into()),
        }
    }

    /// Serve until the shutdown token fires, then release the socket.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        nlog!(
            "server: listening on http://127.0.0.1:{}/ root={}",
            self.port,
            self.root.display()
        );
        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;
        nlog!("server: shut down");
        Ok(())
    }

    fn router(&self) -> Router {
        let mut router = Router::new();
        if self.livereload {
            router = router
                .route("/__nacre/reload", get(reload_events))
                .route("/__nacre/client.js", get(client_js));
        }
        router
            .fallback_service(ServeDir::new(&self.root))
            .with_state(Arc::clone(&self.hub))
    }
}

async fn reload_events(
    State(hub): State<Arc<ReloadHub>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = hub.subscribe();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(generation) => {
                    let event = Event::default().event("reload").data(generation.to_string());
                    return Some((Ok(event), rx));
                }
                // A slow client skipping generations still only needs one reload.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn client_js() -> ([(header::HeaderName, &'static str); 1], &'static str) {
    ([(header::CONTENT_TYPE, "application/javascript")], CLIENT_JS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn server_on(dir: &TempDir, port: u16) -> DevServer {
        DevServer::new(
            &ServerConfig {
                port,
                root: String::new(),
                livereload: true,
            },
            dir.path(),
        )
    }

    async fn http_get(port: u16, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[test]
    fn test_hub_generation_monotonic() {
        let hub = ReloadHub::new();
        assert_eq!(hub.generation(), 0);
        assert_eq!(hub.notify(), 1);
        assert_eq!(hub.notify(), 2);
        assert_eq!(hub.generation(), 2);
    }

    #[tokio::test]
    async fn test_hub_broadcasts_to_subscribers() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();
        assert_eq!(hub.client_count(), 1);

        hub.notify();
        assert_eq!(rx.recv().await.unwrap(), 1);
    }

    #[test]
    fn test_notify_without_subscribers_is_fine() {
        let hub = ReloadHub::new();
        assert_eq!(hub.client_count(), 0);
        assert_eq!(hub.notify(), 1);
    }

    #[tokio::test]
    async fn test_bind_taken_port_is_port_in_use() {
        let dir = TempDir::new().unwrap();
        // Occupy an ephemeral port, then ask the server for the same one.
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let server = server_on(&dir, port);
        match server.bind().await {
            Err(Error::PortInUse(p)) => assert_eq!(p, port),
            other => panic!("expected PortInUse, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_serves_files_and_shuts_down() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>abalone</h1>").unwrap();

        let server = server_on(&dir, 0);
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shutdown = CancellationToken::new();

        let serve_token = shutdown.clone();
        let handle = tokio::spawn(async move { server.serve(listener, serve_token).await });

        let response = http_get(port, "/index.html").await;
        assert!(response.starts_with("HTTP/1.1 200"), "got: {}", response);
        assert!(response.contains("abalone"));

        let missing = http_get(port, "/nope.html").await;
        assert!(missing.starts_with("HTTP/1.1 404"), "got: {}", missing);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should stop after cancellation")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_client_script_served() {
        let dir = TempDir::new().unwrap();
        let server = server_on(&dir, 0);
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shutdown = CancellationToken::new();

        let serve_token = shutdown.clone();
        let handle = tokio::spawn(async move { server.serve(listener, serve_token).await });

        let response = http_get(port, "/__nacre/client.js").await;
        assert!(response.starts_with("HTTP/1.1 200"), "got: {}", response);
        assert!(response.contains("EventSource"));
        assert!(response.contains("application/javascript"));

        shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
}
