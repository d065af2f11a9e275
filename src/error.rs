//! Errors reported synchronously to callers sending messages.
//!
//! Timeouts and lost peers are not errors here: they surface through the
//! timeout and disconnect callbacks, scoped to one exchange or connection.

use std::io;

use thiserror::Error;

use crate::{codec::EncodeError, session::ConnectionId};

/// Why an outbound message was not sent.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SendError {
    /// The message cannot be encoded for this connection. Nothing was written.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// The transport failed part-way through the write.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The connection was reset or lost.
    #[error("{0} is closed")]
    ConnectionClosed(ConnectionId),
    /// Every correlation id is held by a pending request.
    #[error("no free correlation id")]
    IdsExhausted,
}

impl SendError {
    /// Whether the message was rejected as too large for the wire.
    #[must_use]
    pub fn is_oversize(&self) -> bool { matches!(self, Self::Encode(e) if e.is_oversize()) }
}

/// Result type for send operations.
pub type Result<T, E = SendError> = std::result::Result<T, E>;
