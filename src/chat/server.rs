//! Shared state, the accept loop and graceful shutdown.
//!
//! The supervisor owns session lifecycles: it accepts connections, spawns one
//! task per session, and coordinates shutdown (signal every session, wait
//! bounded for queues to drain, force-close the rest). The registry, the
//! moderation table and the history log are the only cross-cutting mutable
//! state; they live together behind one `RwLock` so every admission decision
//! is atomic.

use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

use super::config::ServerConfig;
use super::frame::Frame;
use super::history::HistoryLog;
use super::moderation::ModerationTable;
use super::registry::Registry;
use super::session::{self, SessionEvent};

/// Server identity shown in the welcome frame, taken from the system
/// hostname at startup.
pub static SERVER_NAME: LazyLock<String> = LazyLock::new(|| {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "cove.local".into())
});

/// Shared server state.
#[derive(Debug)]
pub struct ServerState {
    pub registry: Registry,
    pub moderation: ModerationTable,
    pub history: HistoryLog,
    /// Printer queue of the operator console, when one is attached.
    /// Participates in broadcast fan-out so the console sees every notice.
    pub operator_tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

/// Shared, thread-safe server state.
pub type SharedState = Arc<RwLock<ServerState>>;

pub fn new_shared_state(max_clients: usize) -> SharedState {
    Arc::new(RwLock::new(ServerState {
        registry: Registry::new(max_clients),
        moderation: ModerationTable::new(),
        history: HistoryLog::new(),
        operator_tx: None,
    }))
}

/// How long shutdown waits for session tasks to finish before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A running server: bound address, shared state, and the shutdown switch.
pub struct ServerHandle {
    local_addr: SocketAddr,
    state: SharedState,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the listener actually bound (port 0 resolves here).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Graceful shutdown: signal every session, wait (bounded) for their
    /// tasks to finish, abort stragglers, and return the final history
    /// snapshot. No session task survives this call.
    pub async fn shutdown(self) -> Vec<Frame> {
        info!("shutting down");
        let _ = self.shutdown_tx.send(true);
        // The accept task owns the session tasks and only returns once all
        // of them have finished or been aborted.
        let _ = self.accept_task.await;

        let st = self.state.read().await;
        if !st.registry.is_empty() {
            warn!(remaining = st.registry.len(), "sessions aborted before unregistering");
        }
        info!(messages = st.history.len(), "server stopped");
        st.history.snapshot()
    }
}

/// Bind the listener and start accepting. Returns immediately; the accept
/// loop runs as a spawned task until shutdown.
pub async fn bind(config: &ServerConfig) -> std::io::Result<ServerHandle> {
    let listener = TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, max_clients = config.max_clients, "cove listening");

    let state = new_shared_state(config.max_clients);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&state), shutdown_rx));

    Ok(ServerHandle {
        local_addr,
        state,
        shutdown_tx,
        accept_task,
    })
}

/// Run the server with an operator console until shutdown is requested
/// (console `shutdown` command or Ctrl-C).
pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handle = bind(&config).await?;

    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    tokio::spawn(super::console::run(handle.state(), control_tx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = control_rx.recv() => info!("shutdown requested from console"),
    }

    let history = handle.shutdown().await;
    info!("chat history contains {} messages", history.len());
    Ok(())
}

/// Accept loop: admits sockets until the shutdown signal flips, then waits
/// (bounded by [`SHUTDOWN_GRACE`]) for session tasks and aborts the rest.
async fn accept_loop(
    listener: TcpListener,
    state: SharedState,
    shutdown: watch::Receiver<bool>,
) {
    let mut tasks = JoinSet::new();
    let mut shutdown_accept = shutdown.clone();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, addr)) => {
                        info!(%addr, "new connection");
                        let state = Arc::clone(&state);
                        let shutdown = shutdown.clone();
                        tasks.spawn(async move {
                            if let Err(err) = session::handle(socket, addr, state, shutdown).await {
                                warn!(%addr, "client error: {err}");
                            }
                            info!(%addr, "disconnected");
                        });
                    }
                    Err(err) => warn!("accept failed: {err}"),
                }
            }

            // Reap finished sessions so the set stays small.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}

            _ = shutdown_accept.changed() => break,
        }
    }

    // Sessions exit on their own shutdown signal; a task still running past
    // the grace period (e.g. wedged in a socket write) is aborted.
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    while !tasks.is_empty() {
        match tokio::time::timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => {
                warn!(remaining = tasks.len(), "aborting sessions still running");
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_resolves_ephemeral_port() {
        let handle = bind(&ServerConfig::ephemeral(3)).await.unwrap();
        assert_ne!(handle.local_addr().port(), 0);
        let history = handle.shutdown().await;
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn state_starts_empty() {
        let state = new_shared_state(2);
        let st = state.read().await;
        assert!(st.registry.is_empty());
        assert!(st.history.is_empty());
        assert!(st.operator_tx.is_none());
    }
}
