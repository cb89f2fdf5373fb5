//! Protocol constants

/// Subscribe the sending peer's address
pub const MSG_ACCEPT: &[u8] = b"accept";

/// Unsubscribe the sending peer's address and close the connection
pub const MSG_DELETE: &[u8] = b"delete";

/// Default control port
pub const DEFAULT_PORT: u16 = 3513;

/// Size of a single socket read
pub const RECV_BUFFER_SIZE: usize = 2048;

/// Longest token; a pending fragment longer than this can never match
pub const MAX_TOKEN_LEN: usize = 6;
