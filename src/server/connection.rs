//! Per-connection handler
//!
//! Reads control messages from one client socket and applies them to the
//! subscriber registry. Whatever ends the connection, the handler removes
//! its peer from the registry and marks its table entry done before it
//! returns.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::error::Elapsed;

use crate::protocol::{ControlMessage, MessageScanner};
use crate::registry::{PeerAddress, RegistryError, SubscriberRegistry};
use crate::server::config::ServerConfig;
use crate::server::table::{ConnectionTable, EntryId};
use crate::session::{CloseReason, SessionState};
use crate::stats::ServerCounters;

/// A single control connection
pub struct Connection {
    state: SessionState,
    socket: TcpStream,
    read_buf: BytesMut,
    scanner: MessageScanner,
    read_buffer_size: usize,
    idle_timeout: Option<Duration>,
    registry: Arc<SubscriberRegistry>,
    table: Arc<ConnectionTable>,
    counters: Arc<ServerCounters>,
    /// Connection-limit slot, released on close
    permit: Option<OwnedSemaphorePermit>,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(
        id: EntryId,
        socket: TcpStream,
        peer: PeerAddress,
        config: &ServerConfig,
        registry: Arc<SubscriberRegistry>,
        table: Arc<ConnectionTable>,
        counters: Arc<ServerCounters>,
    ) -> Self {
        Self {
            state: SessionState::new(id, peer),
            socket,
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            scanner: MessageScanner::new(),
            read_buffer_size: config.read_buffer_size,
            idle_timeout: config.idle_timeout,
            registry,
            table,
            counters,
            permit: None,
        }
    }

    /// Hold a connection-limit permit for the lifetime of this connection
    pub fn with_permit(mut self, permit: Option<OwnedSemaphorePermit>) -> Self {
        self.permit = permit;
        self
    }

    /// Run the connection until it closes
    ///
    /// Consumes the handler; the socket is closed when this returns.
    pub async fn run(mut self) -> CloseReason {
        let reason = self.read_loop().await;
        self.state.close(reason);

        self.registry.discard(&self.state.peer).await;
        // Free the slot before the entry can be reaped
        drop(self.permit.take());
        self.table.mark_done(self.state.id).await;

        tracing::info!(
            id = self.state.id,
            peer = %self.state.peer,
            reason = %reason,
            bytes = self.state.bytes_received,
            messages = self.state.messages_received,
            duration_ms = self.state.duration().as_millis() as u64,
            "Connection closed"
        );

        reason
    }

    async fn read_loop(&mut self) -> CloseReason {
        loop {
            while let Some(message) = self.scanner.next_message(&mut self.read_buf) {
                self.state.add_message();
                if let Some(reason) = self.handle_message(message).await {
                    return reason;
                }
            }

            self.read_buf.reserve(self.read_buffer_size);
            let read = self.socket.read_buf(&mut self.read_buf);

            match with_deadline(self.idle_timeout, read).await {
                Ok(Ok(0)) => return CloseReason::PeerClosed,
                Ok(Ok(n)) => self.state.add_bytes_received(n),
                Ok(Err(e)) => {
                    tracing::debug!(
                        id = self.state.id,
                        peer = %self.state.peer,
                        error = %e,
                        "Read failed"
                    );
                    return CloseReason::IoError;
                }
                Err(_) => return CloseReason::IdleTimeout,
            }
        }
    }

    /// Apply one message; returns a close reason if the connection should end
    async fn handle_message(&mut self, message: ControlMessage) -> Option<CloseReason> {
        let peer = self.state.peer;

        match message {
            ControlMessage::Accept => {
                self.registry.add(peer).await;
                None
            }
            ControlMessage::Delete => match self.registry.remove(&peer).await {
                Ok(()) => Some(CloseReason::Unsubscribed),
                Err(RegistryError::NotSubscribed(_)) => {
                    self.counters.protocol_violation();
                    tracing::warn!(
                        id = self.state.id,
                        peer = %peer,
                        "delete without prior accept, ignoring"
                    );
                    None
                }
            },
            ControlMessage::Unknown(data) => {
                tracing::debug!(
                    id = self.state.id,
                    peer = %peer,
                    len = data.len(),
                    "Ignoring unknown message"
                );
                None
            }
        }
    }
}

/// Await `fut`, giving up after `deadline` if one is set
async fn with_deadline<F: Future>(
    deadline: Option<Duration>,
    fut: F,
) -> Result<F::Output, Elapsed> {
    match deadline {
        Some(d) => tokio::time::timeout(d, fut).await,
        None => Ok(fut.await),
    }
}
