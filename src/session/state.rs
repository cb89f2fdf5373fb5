//! Session state machine
//!
//! Tracks a control connection from accept to close.

use std::fmt;
use std::time::{Duration, Instant};

use crate::registry::PeerAddress;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Accepted and waiting for messages
    Open,
    /// Finished; the handler is about to exit
    Closed,
}

/// Why a connection reached [`ConnectionPhase::Closed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent `delete`
    Unsubscribed,
    /// Client closed the socket (zero-byte read)
    PeerClosed,
    /// No data within the idle timeout
    IdleTimeout,
    /// Read failed (reset, broken pipe, ...)
    IoError,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::Unsubscribed => "unsubscribed",
            CloseReason::PeerClosed => "peer closed",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::IoError => "I/O error",
        };
        f.write_str(s)
    }
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Table entry id of this connection
    pub id: u64,

    /// Remote peer address, captured at accept
    pub peer: PeerAddress,

    /// Current phase
    pub phase: ConnectionPhase,

    /// Set once the session closes
    pub close_reason: Option<CloseReason>,

    /// Connection start time
    pub connected_at: Instant,

    /// Bytes received
    pub bytes_received: u64,

    /// Control messages received (including unknown ones)
    pub messages_received: u64,
}

impl SessionState {
    /// Create a new open session
    pub fn new(id: u64, peer: PeerAddress) -> Self {
        Self {
            id,
            peer,
            phase: ConnectionPhase::Open,
            close_reason: None,
            connected_at: Instant::now(),
            bytes_received: 0,
            messages_received: 0,
        }
    }

    /// Check if session is still open
    pub fn is_open(&self) -> bool {
        self.phase == ConnectionPhase::Open
    }

    /// Transition to closed
    ///
    /// Only the first reason sticks; closing twice is a no-op.
    pub fn close(&mut self, reason: CloseReason) {
        if self.phase == ConnectionPhase::Open {
            self.phase = ConnectionPhase::Closed;
            self.close_reason = Some(reason);
        }
    }

    pub fn add_bytes_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }

    pub fn add_message(&mut self) {
        self.messages_received += 1;
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
