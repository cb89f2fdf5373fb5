//! Control message scanning
//!
//! TCP gives no message boundaries, so a single read may carry a partial
//! token (`acc`), several tokens (`acceptdelete`) or a token followed by a
//! line ending. The scanner pulls complete tokens off the front of the
//! receive buffer and leaves incomplete ones in place.

use bytes::{Buf, Bytes, BytesMut};

use super::constants::{MAX_TOKEN_LEN, MSG_ACCEPT, MSG_DELETE};

/// A decoded control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Subscribe this connection's peer address
    Accept,
    /// Unsubscribe and close
    Delete,
    /// Anything else; ignored by the handler
    Unknown(Bytes),
}

impl ControlMessage {
    /// Wire token for this message, if it has one
    pub fn token(&self) -> Option<&'static [u8]> {
        match self {
            ControlMessage::Accept => Some(MSG_ACCEPT),
            ControlMessage::Delete => Some(MSG_DELETE),
            ControlMessage::Unknown(_) => None,
        }
    }
}

/// Extracts control messages from a receive buffer
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageScanner;

impl MessageScanner {
    pub fn new() -> Self {
        Self
    }

    /// Pop the next complete message from the front of `buf`
    ///
    /// Returns `None` when the buffer is empty (after whitespace) or holds a
    /// strict prefix of a token that may still be completed by the next read.
    pub fn next_message(&self, buf: &mut BytesMut) -> Option<ControlMessage> {
        let skip = buf
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        buf.advance(skip);

        if buf.is_empty() {
            return None;
        }

        for (token, message) in [
            (MSG_ACCEPT, ControlMessage::Accept),
            (MSG_DELETE, ControlMessage::Delete),
        ] {
            if buf.starts_with(token) {
                buf.advance(token.len());
                return Some(message);
            }
        }

        if buf.len() < MAX_TOKEN_LEN && is_token_prefix(buf) {
            return None;
        }

        let end = buf
            .iter()
            .position(|b| b.is_ascii_whitespace())
            .unwrap_or(buf.len());
        Some(ControlMessage::Unknown(buf.split_to(end).freeze()))
    }
}

fn is_token_prefix(data: &[u8]) -> bool {
    MSG_ACCEPT.starts_with(data) || MSG_DELETE.starts_with(data)
}
