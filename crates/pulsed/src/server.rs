use crate::backend::Backend;
use crate::config::HubConfig;
use crate::error::HubError;
use crate::heartbeat;
use crate::keys::PairingKeys;
use crate::registry::{Registry, Role};
use crate::session::handle_connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Shared state for the telemetry hub.
pub struct HubState {
    /// Registry of dashboard client sinks, keyed by user identity.
    pub clients: Registry,
    /// Registry of reporter sinks, keyed by machine identity.
    pub reporters: Registry,
    /// Live pairing keys for machine enrollment.
    pub keys: PairingKeys,
    /// Account backend collaborator.
    pub backend: Arc<dyn Backend>,
    /// Runtime hub configuration.
    pub config: HubConfig,
    /// Atomic counter for active connections (TOCTOU-safe).
    pub active_connections: AtomicUsize,
}

impl HubState {
    /// Build hub state from a validated config and a backend handle.
    #[must_use]
    pub fn new(config: HubConfig, backend: Arc<dyn Backend>) -> Self {
        Self {
            clients: Registry::new(Role::Client),
            reporters: Registry::new(Role::Reporter),
            keys: PairingKeys::new(config.pairing_ttl()),
            backend,
            config,
            active_connections: AtomicUsize::new(0),
        }
    }

    /// The registry for a connection role.
    #[must_use]
    pub fn registry(&self, role: Role) -> &Registry {
        match role {
            Role::Client => &self.clients,
            Role::Reporter => &self.reporters,
        }
    }
}

/// # Errors
///
/// Returns an error if the accept loop encounters an I/O failure.
pub async fn run(listener: TcpListener, state: Arc<HubState>) -> Result<(), HubError> {
    let (shutdown_tx, _) = tokio::sync::watch::channel(());
    run_with_shutdown(listener, state, shutdown_tx).await
}

/// Run the hub accept loop with an externally-controlled shutdown signal.
///
/// Starts the heartbeat scheduler against the same signal. When the
/// `shutdown_tx` sender fires or is dropped, the accept loop stops
/// accepting new connections and waits for in-flight connections to
/// finish.
///
/// # Errors
///
/// Returns an error if the accept loop encounters an I/O failure.
pub async fn run_with_shutdown(
    listener: TcpListener,
    state: Arc<HubState>,
    shutdown_tx: tokio::sync::watch::Sender<()>,
) -> Result<(), HubError> {
    let local_addr = listener.local_addr().map_err(HubError::Io)?;
    info!("hub listening on {}", local_addr);
    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::spawn(heartbeat::run(Arc::clone(&state), shutdown_tx.subscribe()));

    let task_tracker = Arc::new(tokio::sync::Notify::new());
    let mut active_tasks: usize = 0;

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        if state.active_connections.load(Ordering::Relaxed) >= state.config.max_conns {
                            warn!("max connections reached, rejecting {}", addr);
                            drop(stream);
                            continue;
                        }
                        state.active_connections.fetch_add(1, Ordering::Relaxed);
                        let state = Arc::clone(&state);
                        let tracker = task_tracker.clone();
                        active_tasks += 1;
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, Arc::clone(&state)).await {
                                tracing::debug!("connection from {} closed: {}", addr, e);
                            }
                            state.active_connections.fetch_sub(1, Ordering::Relaxed);
                            tracker.notify_one();
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!("shutdown signal received, draining {} connections", active_tasks);
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (with timeout)
    let drain_timeout = std::time::Duration::from_secs(30);
    let deadline = tokio::time::Instant::now() + drain_timeout;
    while active_tasks > 0 {
        if tokio::time::timeout_at(deadline, task_tracker.notified())
            .await
            .is_err()
        {
            warn!(
                "drain timeout reached with {} connections still active",
                active_tasks
            );
            break;
        }
        active_tasks = active_tasks.saturating_sub(1);
    }

    info!("hub shut down gracefully");
    Ok(())
}
