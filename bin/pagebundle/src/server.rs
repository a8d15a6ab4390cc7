//! Development server with live reload support

use std::{convert::Infallible, net::SocketAddr, path::Path, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use color_eyre::eyre::{Result, WrapErr};
use pagebundle_generator::LiveReload;
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use tower_http::services::ServeDir;

/// Path of the server-sent events endpoint.
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// Server state containing the reload broadcaster.
#[derive(Clone)]
pub struct ServerState {
    /// Broadcast channel for live reload events.
    pub reload_tx: broadcast::Sender<()>,
}

impl ServerState {
    /// Create a new server state.
    pub fn new() -> Self {
        let (reload_tx, _) = broadcast::channel(16);
        Self { reload_tx }
    }

    /// Send a reload notification to all connected clients.
    pub fn notify_reload(&self) {
        // No receivers just means no browser is connected.
        let _ = self.reload_tx.send(());
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the development server router.
///
/// The live reload endpoint is only mounted when `watch` is set.
pub fn create_router(output_dir: &Path, watch: bool, state: Arc<ServerState>) -> Router {
    let router = Router::new();
    let router = if watch {
        router.route(LIVERELOAD_PATH, get(livereload_handler))
    } else {
        router
    };
    router
        .fallback_service(ServeDir::new(output_dir))
        .with_state(state)
}

async fn livereload_handler(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.reload_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(()) => Some(Ok(Event::default().data("reload"))),
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

/// A running development server.
///
/// Serves the output directory; in watch mode it also pushes reload events
/// to every page that carries [`LIVERELOAD_SCRIPT`].
pub struct DevServer {
    addr: SocketAddr,
    watch: bool,
    state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for DevServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServer")
            .field("addr", &self.addr)
            .field("watch", &self.watch)
            .finish_non_exhaustive()
    }
}

impl DevServer {
    /// Bind `127.0.0.1:port` and start serving `dest` in the background.
    ///
    /// Port `0` picks a free port; [`DevServer::port`] reports it.
    pub async fn start(dest: &Path, watch: bool, port: u16) -> Result<Self> {
        let state = Arc::new(ServerState::new());
        let app = create_router(dest, watch, state.clone());

        let addr = format!("127.0.0.1:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .wrap_err_with(|| format!("Failed to bind to {addr}"))?;
        let addr = listener
            .local_addr()
            .wrap_err("Failed to read server address")?;

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "server error");
            }
        });

        println!("server running on http://localhost:{}", addr.port());
        tracing::info!(%addr, dest = %dest.display(), watch, "dev server started");

        Ok(Self {
            addr,
            watch,
            state,
            task,
        })
    }

    /// Port the server listens on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Tell connected browsers to reload.
    pub fn reload(&self) {
        self.state.notify_reload();
    }

    /// Wait until the server task ends.
    pub async fn wait(mut self) -> Result<()> {
        (&mut self.task).await.wrap_err("Server task failed")
    }
}

impl Drop for DevServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl LiveReload for DevServer {
    fn reload(&self) {
        DevServer::reload(self);
    }

    fn client_script(&self) -> Option<String> {
        self.watch.then(|| LIVERELOAD_SCRIPT.to_string())
    }
}

/// JavaScript snippet injected for live reload.
pub const LIVERELOAD_SCRIPT: &str = r#"
<script>
(function() {
    const source = new EventSource('/__livereload');
    source.onmessage = function(event) {
        if (event.data === 'reload') {
            window.location.reload();
        }
    };
    source.onerror = function() {
        console.log('[livereload] Connection lost, retrying...');
    };
})();
</script>
"#;
