//! Crate error types

use std::net::SocketAddr;

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// The listening socket could not be bound (address in use, permission denied)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// I/O error outside of a single connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let addr: SocketAddr = "127.0.0.1:3513".parse().unwrap();
        let err = Error::Bind {
            addr,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };

        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:3513"));
        assert!(msg.contains("address in use"));
    }
}
