//! Control server
//!
//! - [`ListenerServer`]: listening socket and accept loop
//! - [`Connection`]: one task per accepted client
//! - [`ConnectionTable`]: live handlers plus the reaper that reclaims them

pub mod config;
pub mod connection;
pub mod listener;
pub mod shutdown;
pub mod table;

pub use config::{primary_interface_addr, ServerConfig};
pub use connection::Connection;
pub use listener::{ListenerServer, ServerHandle};
pub use shutdown::{Shutdown, ShutdownListener};
pub use table::{ConnectionTable, EntryId, EntryInfo};
