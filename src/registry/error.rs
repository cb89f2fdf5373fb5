//! Registry error types

use thiserror::Error;

use super::peer::PeerAddress;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// `delete` arrived for an address that never sent `accept`
    #[error("peer not subscribed: {0}")]
    NotSubscribed(PeerAddress),
}
