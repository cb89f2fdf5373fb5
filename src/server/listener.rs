//! Control server listener
//!
//! Handles the TCP accept loop and spawns connection handlers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::registry::{PeerAddress, SubscriberRegistry};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::shutdown::{Shutdown, ShutdownListener};
use crate::server::table::ConnectionTable;
use crate::stats::{spawn_reporter, ServerCounters, ServerStats};

/// Control server bound to its listening socket
pub struct ListenerServer {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<SubscriberRegistry>,
    table: Arc<ConnectionTable>,
    counters: Arc<ServerCounters>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl ListenerServer {
    /// Bind the listening socket with a fresh registry
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        Self::bind_with_registry(config, Arc::new(SubscriberRegistry::new())).await
    }

    /// Bind the listening socket, sharing an existing registry
    ///
    /// Lets the stream sender hold the registry before the server starts.
    pub async fn bind_with_registry(
        config: ServerConfig,
        registry: Arc<SubscriberRegistry>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| Error::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "Control server listening");

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Ok(Self {
            config,
            listener,
            local_addr,
            registry,
            table: Arc::new(ConnectionTable::new()),
            counters: Arc::new(ServerCounters::new()),
            connection_semaphore,
        })
    }

    /// Address the socket is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get a reference to the subscriber registry
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Get a reference to the connection table
    pub fn table(&self) -> &Arc<ConnectionTable> {
        &self.table
    }

    /// Current server statistics
    pub async fn stats(&self) -> ServerStats {
        collect_stats(&self.counters, &self.table, &self.registry).await
    }

    /// Run the server until `shutdown` resolves, then stop it
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        let handle = self.spawn();
        shutdown.await;
        tracing::info!("Shutdown signal received");
        handle.stop().await;
    }

    /// Start the accept loop, the reaper and (in verbose mode) the reporter
    /// on background tasks
    pub fn spawn(self) -> ServerHandle {
        let shutdown = Shutdown::new();

        let reaper = self
            .table
            .spawn_reaper(self.config.reap_interval, shutdown.subscribe());

        let reporter = if self.config.verbose {
            Some(spawn_reporter(
                self.config.stats_interval,
                Arc::clone(&self.table),
                Arc::clone(&self.registry),
                shutdown.subscribe(),
            ))
        } else {
            None
        };

        let local_addr = self.local_addr;
        let registry = Arc::clone(&self.registry);
        let table = Arc::clone(&self.table);
        let counters = Arc::clone(&self.counters);
        let shutdown_timeout = self.config.shutdown_timeout;

        let accept = tokio::spawn(self.accept_loop(shutdown.subscribe()));

        ServerHandle {
            local_addr,
            registry,
            table,
            counters,
            shutdown,
            shutdown_timeout,
            accept,
            reaper,
            reporter,
        }
    }

    async fn accept_loop(self, mut shutdown: ShutdownListener) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                result = self.listener.accept() => match result {
                    Ok((socket, peer_addr)) => {
                        self.handle_connection(socket, peer_addr).await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                        // Errors like EMFILE persist; don't spin on them
                        tokio::time::sleep(self.config.accept_backoff).await;
                    }
                },
            }
        }

        tracing::info!(addr = %self.local_addr, "Accept loop stopped");
    }

    async fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.counters.connection_rejected();
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(peer = %peer_addr, error = %e, "Failed to configure socket");
            return;
        }

        self.counters.connection_accepted();
        let peer = PeerAddress::from(peer_addr);

        let registry = Arc::clone(&self.registry);
        let table = Arc::clone(&self.table);
        let counters = Arc::clone(&self.counters);
        let config = &self.config;

        let id = self
            .table
            .register(peer, move |id| {
                let connection =
                    Connection::new(id, socket, peer, config, registry, table, counters)
                        .with_permit(permit);

                tokio::spawn(async move {
                    connection.run().await;
                })
            })
            .await;

        tracing::info!(id = id, peer = %peer, "Connected");
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

/// Handle to a running server
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<SubscriberRegistry>,
    table: Arc<ConnectionTable>,
    counters: Arc<ServerCounters>,
    shutdown: Shutdown,
    shutdown_timeout: Duration,
    accept: JoinHandle<()>,
    reaper: Option<JoinHandle<()>>,
    reporter: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn table(&self) -> &Arc<ConnectionTable> {
        &self.table
    }

    pub async fn stats(&self) -> ServerStats {
        collect_stats(&self.counters, &self.table, &self.registry).await
    }

    /// Stop the server
    ///
    /// Stops accepting, then waits (bounded by the shutdown timeout) for the
    /// accept loop, the reaper and the reporter to exit. Connections already
    /// accepted keep running until their clients finish.
    pub async fn stop(self) {
        self.shutdown.trigger();

        join_bounded("accept loop", Some(self.accept), self.shutdown_timeout).await;
        join_bounded("reaper", self.reaper, self.shutdown_timeout).await;
        join_bounded("reporter", self.reporter, self.shutdown_timeout).await;

        tracing::info!(
            connections = self.table.connection_count(),
            "Server stopped"
        );
    }
}

async fn join_bounded(name: &str, handle: Option<JoinHandle<()>>, timeout: Duration) {
    let Some(mut handle) = handle else {
        return;
    };

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(())) => tracing::debug!(task = name, "Task finished"),
        Ok(Err(e)) => tracing::error!(task = name, error = %e, "Task failed"),
        Err(_) => {
            tracing::warn!(task = name, "Timed out waiting for task, aborting");
            handle.abort();
        }
    }
}

async fn collect_stats(
    counters: &ServerCounters,
    table: &ConnectionTable,
    registry: &SubscriberRegistry,
) -> ServerStats {
    ServerStats {
        total_connections: counters.total_connections(),
        rejected_connections: counters.rejected_connections(),
        protocol_violations: counters.protocol_violations(),
        active_connections: table.connection_count(),
        subscribers: registry.len().await,
        uptime: counters.uptime(),
    }
}
