//! Connection table and reaper
//!
//! Every accepted connection gets an entry keyed by a monotonically
//! increasing [`EntryId`]. Ids are never reused or shifted, so a handler
//! marking its own entry done can never hit someone else's slot while the
//! reaper removes entries or the accept loop appends new ones.
//!
//! ```text
//!   accept loop ──register──►┌──────────────────────┐
//!                            │ HashMap<EntryId,     │
//!   handler ────mark_done───►│   ConnectionEntry>   │◄── sweep ── reaper
//!        │                   └──────────────────────┘      ▲
//!        └───────────── completion channel ────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::registry::PeerAddress;
use crate::server::shutdown::ShutdownListener;

/// Stable identifier of a table entry
pub type EntryId = u64;

/// Bookkeeping for one connection handler
#[derive(Debug)]
struct ConnectionEntry {
    /// Task running the handler
    handle: JoinHandle<()>,
    /// Cleared by the handler when its connection closes
    alive: bool,
    peer: PeerAddress,
    connected_at: Instant,
}

impl ConnectionEntry {
    /// Entry can be removed: marked done, or its task ended without saying so
    fn is_reapable(&self) -> bool {
        !self.alive || self.handle.is_finished()
    }
}

/// Diagnostic view of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub id: EntryId,
    pub peer: PeerAddress,
    pub alive: bool,
}

#[derive(Debug)]
struct Inner {
    entries: HashMap<EntryId, ConnectionEntry>,
    next_id: EntryId,
}

/// Table of live connection handlers
///
/// Registration, completion and removal all go through one lock.
pub struct ConnectionTable {
    inner: Mutex<Inner>,
    /// Logical connection count: +1 per register, -1 per reaped entry
    connections: AtomicUsize,
    done_tx: mpsc::UnboundedSender<EntryId>,
    done_rx: Mutex<Option<mpsc::UnboundedReceiver<EntryId>>>,
}

impl ConnectionTable {
    /// Create an empty table
    pub fn new() -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                next_id: 1,
            }),
            connections: AtomicUsize::new(0),
            done_tx,
            done_rx: Mutex::new(Some(done_rx)),
        }
    }

    /// Register a new connection
    ///
    /// `spawn` receives the id of the new entry and must return the handle of
    /// the task it started. The table lock is held across the call, so the
    /// handler cannot mark itself done before its entry exists.
    pub async fn register<F>(&self, peer: PeerAddress, spawn: F) -> EntryId
    where
        F: FnOnce(EntryId) -> JoinHandle<()>,
    {
        let mut inner = self.inner.lock().await;

        let id = inner.next_id;
        inner.next_id += 1;

        let handle = spawn(id);
        inner.entries.insert(
            id,
            ConnectionEntry {
                handle,
                alive: true,
                peer,
                connected_at: Instant::now(),
            },
        );
        let count = self.connections.fetch_add(1, Ordering::AcqRel) + 1;

        tracing::debug!(id = id, peer = %peer, connections = count, "Connection registered");
        id
    }

    /// Mark an entry as finished
    ///
    /// Called by a handler on its own entry. The reaper removes it later.
    pub async fn mark_done(&self, id: EntryId) {
        {
            let mut inner = self.inner.lock().await;
            match inner.entries.get_mut(&id) {
                Some(entry) => entry.alive = false,
                None => {
                    tracing::debug!(id = id, "mark_done on unknown entry");
                    return;
                }
            }
        }

        // Receiver only goes away when the table is dropped
        let _ = self.done_tx.send(id);
    }

    /// Remove one finished entry
    async fn reap(&self, id: EntryId) -> bool {
        let mut inner = self.inner.lock().await;

        let reapable = inner
            .entries
            .get(&id)
            .map(ConnectionEntry::is_reapable)
            .unwrap_or(false);
        if !reapable {
            return false;
        }

        if let Some(entry) = inner.entries.remove(&id) {
            let count = self.connections.fetch_sub(1, Ordering::AcqRel) - 1;
            tracing::debug!(
                id = id,
                peer = %entry.peer,
                lifetime_ms = entry.connected_at.elapsed().as_millis() as u64,
                connections = count,
                "Connection reaped"
            );
        }
        true
    }

    /// Run one sweep over the table
    ///
    /// Removes every entry marked done, plus entries whose task ended without
    /// marking done (a panicked handler). Returns the number removed.
    pub async fn reap_finished(&self) -> usize {
        let mut inner = self.inner.lock().await;

        let ids: Vec<EntryId> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_reapable())
            .map(|(id, _)| *id)
            .collect();

        for id in &ids {
            if let Some(entry) = inner.entries.remove(id) {
                if entry.alive {
                    tracing::warn!(id = *id, peer = %entry.peer, "Handler exited without marking done");
                }
                self.connections.fetch_sub(1, Ordering::AcqRel);
            }
        }

        if !ids.is_empty() {
            tracing::debug!(
                removed = ids.len(),
                connections = self.connection_count(),
                "Reaper sweep"
            );
        }

        ids.len()
    }

    /// Spawn the background reaper
    ///
    /// Removes entries as soon as their handler reports completion, and
    /// sweeps the whole table every `interval` to catch anything missed.
    /// Only one reaper can run per table; a second call returns `None`.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: ShutdownListener,
    ) -> Option<JoinHandle<()>> {
        let mut done_rx = self.done_rx.try_lock().ok()?.take()?;
        let table = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    Some(id) = done_rx.recv() => {
                        table.reap(id).await;
                    }
                    _ = ticker.tick() => {
                        table.reap_finished().await;
                    }
                }
            }

            // Hand the receiver back so a restarted reaper can pick it up
            *table.done_rx.lock().await = Some(done_rx);
            tracing::debug!("Reaper stopped");
        }))
    }

    /// Logical connection count
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// Number of entries whose handler has not finished yet
    pub async fn alive_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .entries
            .values()
            .filter(|entry| entry.alive)
            .count()
    }

    /// Snapshot of all entries, ordered by id
    pub async fn entries(&self) -> Vec<EntryInfo> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<EntryInfo> = inner
            .entries
            .iter()
            .map(|(id, entry)| EntryInfo {
                id: *id,
                peer: entry.peer,
                alive: entry.alive,
            })
            .collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::sync::oneshot;

    use super::*;
    use crate::server::shutdown::Shutdown;

    fn peer(port: u16) -> PeerAddress {
        PeerAddress::from(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    /// Spawn a task that finishes when the returned sender fires
    fn parked_task() -> (oneshot::Sender<()>, impl FnOnce(EntryId) -> JoinHandle<()>) {
        let (tx, rx) = oneshot::channel::<()>();
        let spawn = move |_id: EntryId| {
            tokio::spawn(async move {
                let _ = rx.await;
            })
        };
        (tx, spawn)
    }

    async fn wait_until_empty(table: &ConnectionTable) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while table.connection_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("table did not drain");
    }

    #[tokio::test]
    async fn test_register_assigns_stable_ids() {
        let table = ConnectionTable::new();
        let (_tx1, spawn1) = parked_task();
        let (_tx2, spawn2) = parked_task();

        let id1 = table.register(peer(1), spawn1).await;
        let id2 = table.register(peer(2), spawn2).await;

        assert_ne!(id1, id2);
        assert_eq!(table.connection_count(), 2);
        assert_eq!(table.alive_count().await, 2);

        let entries = table.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, id1);
        assert_eq!(entries[0].peer, peer(1));
        assert!(entries[0].alive);
    }

    #[tokio::test]
    async fn test_mark_done_then_sweep() {
        let table = ConnectionTable::new();
        let (_tx1, spawn1) = parked_task();
        let (_tx2, spawn2) = parked_task();

        let id1 = table.register(peer(1), spawn1).await;
        let _id2 = table.register(peer(2), spawn2).await;

        table.mark_done(id1).await;
        assert_eq!(table.alive_count().await, 1);
        // Not removed until the reaper runs
        assert_eq!(table.connection_count(), 2);

        assert_eq!(table.reap_finished().await, 1);
        assert_eq!(table.connection_count(), 1);
        assert_eq!(table.entries().await.len(), 1);

        // A second sweep finds nothing to do
        assert_eq!(table.reap_finished().await, 0);
        assert_eq!(table.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_mark_done_unknown_is_ignored() {
        let table = ConnectionTable::new();

        table.mark_done(42).await;

        assert_eq!(table.reap_finished().await, 0);
        assert_eq!(table.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_finished_task_without_mark_done_is_reaped() {
        let table = ConnectionTable::new();
        let (tx, spawn) = parked_task();

        table.register(peer(1), spawn).await;
        let _ = tx.send(());

        tokio::time::timeout(Duration::from_secs(2), async {
            while table.reap_finished().await == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("finished task never reaped");

        assert_eq!(table.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_handler_marking_done_immediately() {
        let table = Arc::new(ConnectionTable::new());
        let shutdown = Shutdown::new();
        let reaper = table
            .spawn_reaper(Duration::from_millis(20), shutdown.subscribe())
            .unwrap();

        let handler_table = Arc::clone(&table);
        table
            .register(peer(1), move |id| {
                tokio::spawn(async move { handler_table.mark_done(id).await })
            })
            .await;

        wait_until_empty(&table).await;
        assert!(table.entries().await.is_empty());

        shutdown.trigger();
        reaper.await.unwrap();
    }

    #[tokio::test]
    async fn test_single_reaper() {
        let table = Arc::new(ConnectionTable::new());
        let shutdown = Shutdown::new();

        let first = table.spawn_reaper(Duration::from_millis(20), shutdown.subscribe());
        assert!(first.is_some());
        assert!(table
            .spawn_reaper(Duration::from_millis(20), shutdown.subscribe())
            .is_none());

        shutdown.trigger();
        first.unwrap().await.unwrap();

        // Receiver was handed back, so a new reaper can start
        let restarted = Shutdown::new();
        let second = table.spawn_reaper(Duration::from_millis(20), restarted.subscribe());
        assert!(second.is_some());
        restarted.trigger();
        second.unwrap().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_and_complete() {
        let table = Arc::new(ConnectionTable::new());
        let shutdown = Shutdown::new();
        let reaper = table
            .spawn_reaper(Duration::from_millis(10), shutdown.subscribe())
            .unwrap();

        let mut registrars = Vec::new();
        for port in 0..100u16 {
            let table = Arc::clone(&table);
            registrars.push(tokio::spawn(async move {
                let handler_table = Arc::clone(&table);
                table
                    .register(peer(port), move |id| {
                        tokio::spawn(async move {
                            tokio::task::yield_now().await;
                            handler_table.mark_done(id).await;
                        })
                    })
                    .await
            }));
        }

        let mut ids = Vec::new();
        for registrar in registrars {
            ids.push(registrar.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 100);

        wait_until_empty(&table).await;
        assert_eq!(table.alive_count().await, 0);

        shutdown.trigger();
        reaper.await.unwrap();
    }
}
