//! Buffer-size negotiation messages.
//!
//! A connection starts at the configured default frame capacity. Either side
//! may send `BUFFER_SIZE_REQUEST` carrying a four-byte big-endian capacity;
//! the receiver adopts it and echoes it back in `BUFFER_SIZE_RESPONSE`, which
//! the requester adopts in turn.

use bytes::Bytes;
use thiserror::Error;

use crate::{
    byte_order::{read_network_u32, write_network_u32},
    message::{Message, Method},
};

/// Smallest capacity a connection accepts.
///
/// Anything lower could not hold an ordinary request header.
pub const MIN_CAPACITY: usize = 16;

/// Largest capacity a connection accepts (16 MiB).
pub const MAX_CAPACITY: usize = 16 * 1024 * 1024;

/// Clamp a requested capacity into the supported range.
#[must_use]
pub fn clamp_capacity(value: usize) -> usize { value.clamp(MIN_CAPACITY, MAX_CAPACITY) }

/// Problems with a buffer-size message body.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NegotiationError {
    /// The body is not exactly four bytes.
    #[error("buffer size body must be 4 bytes, got {len}")]
    InvalidLength {
        /// Body length received.
        len: usize,
    },
}

/// Build a `BUFFER_SIZE_REQUEST` announcing `capacity`.
#[must_use]
pub fn buffer_size_request(capacity: usize) -> Message {
    buffer_size_message(Method::BufferSizeRequest, capacity)
}

/// Build the `BUFFER_SIZE_RESPONSE` confirming `capacity`.
#[must_use]
pub fn buffer_size_response(capacity: usize) -> Message {
    buffer_size_message(Method::BufferSizeResponse, capacity)
}

fn buffer_size_message(method: Method, capacity: usize) -> Message {
    let value = u32::try_from(clamp_capacity(capacity)).unwrap_or(u32::MAX);
    Message::new(method).with_body(Bytes::copy_from_slice(&write_network_u32(value)))
}

/// Read the capacity carried by a buffer-size message, clamped to range.
///
/// # Errors
///
/// Returns [`NegotiationError::InvalidLength`] if the body is not four bytes.
pub fn read_capacity(message: &Message) -> Result<usize, NegotiationError> {
    let body = message.body().map_or(&[][..], |body| &body[..]);
    let raw = <[u8; 4]>::try_from(body)
        .map_err(|_| NegotiationError::InvalidLength { len: body.len() })?;
    let value = usize::try_from(read_network_u32(raw)).unwrap_or(MAX_CAPACITY);
    Ok(clamp_capacity(value))
}
