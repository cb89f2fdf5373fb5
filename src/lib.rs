//! subreg: TCP control listener for stream subscribers
//!
//! Remote clients open a persistent TCP connection and send one of two
//! literal tokens:
//!
//! - `accept` subscribes the client's observed peer address
//! - `delete` unsubscribes it and ends the connection
//!
//! The listener keeps the resulting set of addresses in a
//! [`SubscriberRegistry`] that an external stream sender pulls with
//! [`SubscriberRegistry::snapshot`]. Nothing is ever written back to the
//! client.
//!
//! ```text
//!   client ──TCP──► ListenerServer ──spawn──► ConnectionHandler
//!                        │                         │
//!                        │ register                │ add / remove
//!                        ▼                         ▼
//!                  ConnectionTable ◄─mark_done─ SubscriberRegistry ◄── sender
//!                        │
//!                      reaper
//! ```
//!
//! # Example
//!
//! ```no_run
//! use subreg::{ListenerServer, ServerConfig};
//!
//! # async fn run() -> subreg::Result<()> {
//! let config = ServerConfig::default().verbose(true);
//! let server = ListenerServer::bind(config).await?;
//! let registry = server.registry().clone();
//!
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await;
//! println!("subscribers left: {:?}", registry.snapshot().await);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use registry::{PeerAddress, RegistryError, SubscriberRegistry};
pub use server::{ConnectionTable, EntryId, ListenerServer, ServerConfig, ServerHandle};
