//! Subscriber registry
//!
//! The registry is the set of peer addresses that currently want to receive
//! the stream. Connection handlers mutate it; the stream sender only ever
//! reads a [`SubscriberRegistry::snapshot`].
//!
//! # Architecture
//!
//! ```text
//!                      Arc<SubscriberRegistry>
//!                     ┌───────────────────────┐
//!                     │ peers: RwLock<        │
//!                     │   HashSet<PeerAddress>│
//!                     │ >                     │
//!                     └───────────┬───────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Handler A]             [Handler B]           [Stream sender]
//!    add / remove            add / remove            snapshot()
//! ```

pub mod error;
pub mod peer;
pub mod store;

pub use error::RegistryError;
pub use peer::PeerAddress;
pub use store::SubscriberRegistry;
