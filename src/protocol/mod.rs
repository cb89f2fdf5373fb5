//! Control protocol
//!
//! The protocol has exactly two messages, both bare ASCII tokens with no
//! length prefix and no reply:
//!
//! ```text
//! Client                                   Server
//!   |                                        |
//!   |------- "accept" --------------------->|  add peer to registry
//!   |                                        |
//!   |------- "delete" --------------------->|  remove peer, close
//!   |                                        |
//! ```

pub mod constants;
pub mod message;

pub use message::{ControlMessage, MessageScanner};
