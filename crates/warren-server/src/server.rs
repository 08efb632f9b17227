//! Accept loop and shared broker state.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::session::Session;
use anyhow::Result;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use warren_core::{Dispatcher, VirtualHostRegistry};
use warren_transport::{Connection, TcpConfig, TcpTransport, Transport};

/// Shared server state.
pub struct ServerState {
    /// Server configuration.
    pub config: Config,
    /// Virtual hosts clients may open.
    pub vhosts: VirtualHostRegistry,
    /// Channel-level method handlers.
    pub dispatcher: Dispatcher,
    active: AtomicUsize,
}

impl ServerState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let vhosts = VirtualHostRegistry::with_hosts(config.virtual_hosts.iter().cloned());
        Self {
            config,
            vhosts,
            dispatcher: Dispatcher::new(),
            active: AtomicUsize::new(0),
        }
    }

    /// Connections currently being served.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

/// Bind the listener and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let transport = TcpTransport::new(TcpConfig {
        bind_addr: config.bind_addr()?,
        max_frame_size: config.limits.frame_max as usize,
        nodelay: true,
    })
    .await?;

    info!(
        addr = ?transport.local_addr(),
        versions = ?config.protocol.supported,
        virtual_hosts = ?config.virtual_hosts,
        "Warren listening"
    );

    let state = Arc::new(ServerState::new(config));
    serve(transport, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Accept connections from `transport` until `shutdown` resolves.
///
/// # Errors
///
/// Currently never fails; accept errors are logged and skipped.
pub async fn serve<T, F>(transport: T, state: Arc<ServerState>, shutdown: F) -> Result<()>
where
    T: Transport,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!(active = state.active_connections(), "Shutting down");
                return Ok(());
            }
            accepted = transport.accept() => {
                let mut conn = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(transport = transport.name(), error = %e, "Accept failed");
                        metrics::record_error("accept");
                        continue;
                    }
                };

                let limit = state.config.limits.max_connections;
                if state.active.fetch_add(1, Ordering::AcqRel) >= limit {
                    state.active.fetch_sub(1, Ordering::AcqRel);
                    warn!(connection = %conn.id(), limit, "Connection limit reached");
                    let _ = conn.close().await;
                    continue;
                }

                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    handle_connection(conn, &state).await;
                    state.active.fetch_sub(1, Ordering::AcqRel);
                });
            }
        }
    }
}

async fn handle_connection(conn: Box<dyn Connection>, state: &Arc<ServerState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let id = conn.id().clone();
    debug!(connection = %id, peer = ?conn.remote_addr(), "Accepted connection");

    let session = match Session::start(conn, Arc::clone(state)).await {
        Ok(Some(session)) => session,
        Ok(None) => return,
        Err(e) => {
            warn!(connection = %id, error = %e, "Handshake failed");
            metrics::record_error("handshake");
            return;
        }
    };

    let version = session.version();
    match session.run().await {
        Ok(()) => info!(connection = %id, version = %version, "Connection closed"),
        Err(e) => {
            warn!(connection = %id, version = %version, error = %e, "Connection error");
            metrics::record_error("connection");
        }
    }
}
