//! Subscriber registry implementation

use std::collections::HashSet;

use tokio::sync::RwLock;

use super::error::RegistryError;
use super::peer::PeerAddress;

/// Shared set of subscribed peer addresses
///
/// Every operation takes the lock exactly once, so each call is atomic with
/// respect to every other call. Readers get copies, never the live set.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    peers: RwLock<HashSet<PeerAddress>>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a peer
    ///
    /// Idempotent. Returns `true` if the peer was not yet subscribed.
    pub async fn add(&self, peer: PeerAddress) -> bool {
        let mut peers = self.peers.write().await;
        let inserted = peers.insert(peer);

        if inserted {
            tracing::info!(peer = %peer, subscribers = peers.len(), "Subscriber added");
        } else {
            tracing::debug!(peer = %peer, "Subscriber already present");
        }

        inserted
    }

    /// Unsubscribe a peer that is known to be subscribed
    ///
    /// Fails with [`RegistryError::NotSubscribed`] and leaves the set untouched
    /// if the peer never subscribed.
    pub async fn remove(&self, peer: &PeerAddress) -> Result<(), RegistryError> {
        let mut peers = self.peers.write().await;

        if !peers.remove(peer) {
            return Err(RegistryError::NotSubscribed(*peer));
        }

        tracing::info!(peer = %peer, subscribers = peers.len(), "Subscriber removed");
        Ok(())
    }

    /// Remove a peer if present
    ///
    /// Used when a connection closes, however it closed. Returns whether the
    /// peer was subscribed.
    pub async fn discard(&self, peer: &PeerAddress) -> bool {
        let mut peers = self.peers.write().await;
        let removed = peers.remove(peer);

        if removed {
            tracing::info!(
                peer = %peer,
                subscribers = peers.len(),
                "Subscriber dropped on disconnect"
            );
        }

        removed
    }

    /// Point-in-time copy of the subscribed addresses, in no particular order
    pub async fn snapshot(&self) -> Vec<PeerAddress> {
        self.peers.read().await.iter().copied().collect()
    }

    /// Check whether a peer is subscribed
    pub async fn contains(&self, peer: &PeerAddress) -> bool {
        self.peers.read().await.contains(peer)
    }

    /// Number of subscribers
    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Check whether there are no subscribers
    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}
