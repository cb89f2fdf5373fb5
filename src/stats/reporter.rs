//! Periodic status reporting
//!
//! In verbose mode the server logs the connection table and the subscriber
//! set at a fixed cadence, which makes leaks of entries or addresses easy to
//! spot from the console.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::registry::SubscriberRegistry;
use crate::server::shutdown::ShutdownListener;
use crate::server::table::ConnectionTable;

/// Spawn the status reporter
pub fn spawn_reporter(
    interval: Duration,
    table: Arc<ConnectionTable>,
    registry: Arc<SubscriberRegistry>,
    mut shutdown: ShutdownListener,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let entries = table.entries().await;
                    let alive: Vec<bool> = entries.iter().map(|e| e.alive).collect();
                    let subscribers = registry.snapshot().await;

                    tracing::info!(
                        connections = table.connection_count(),
                        entries = ?alive,
                        subscribers = ?subscribers,
                        "Status"
                    );
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PeerAddress;
    use crate::server::shutdown::Shutdown;

    #[tokio::test]
    async fn test_reporter_stops_on_shutdown() {
        let table = Arc::new(ConnectionTable::new());
        let registry = Arc::new(SubscriberRegistry::new());
        let peer: PeerAddress = "127.0.0.1:40000".parse::<std::net::SocketAddr>().unwrap().into();
        registry.add(peer).await;
        table
            .register(peer, |_| tokio::spawn(std::future::pending::<()>()))
            .await;

        let shutdown = Shutdown::new();
        let reporter = spawn_reporter(
            Duration::from_millis(10),
            Arc::clone(&table),
            Arc::clone(&registry),
            shutdown.subscribe(),
        );

        // Let it report a few times
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reporter.is_finished());

        shutdown.trigger();
        let joined = tokio::time::timeout(Duration::from_secs(1), reporter).await;
        assert!(joined.is_ok(), "reporter kept running after shutdown");
        assert!(joined.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_reporter_exits_if_already_shut_down() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let reporter = spawn_reporter(
            Duration::from_secs(60),
            Arc::new(ConnectionTable::new()),
            Arc::new(SubscriberRegistry::new()),
            shutdown.subscribe(),
        );

        assert!(tokio::time::timeout(Duration::from_secs(1), reporter)
            .await
            .is_ok());
    }
}
