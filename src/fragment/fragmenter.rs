//! Outbound helper that splits an encoded message into capacity-sized writes.

use std::num::NonZeroUsize;

use bytes::{Bytes, BytesMut};

use crate::{
    codec::{self, EncodeError},
    message::Message,
};

/// Splits messages into physical frames no larger than the frame capacity.
#[derive(Clone, Copy, Debug)]
pub struct Fragmenter {
    capacity: NonZeroUsize,
}

impl Fragmenter {
    /// Create a fragmenter for frames of at most `capacity` bytes.
    #[must_use]
    pub const fn new(capacity: NonZeroUsize) -> Self { Self { capacity } }

    /// Frame capacity in bytes.
    #[must_use]
    pub const fn capacity(&self) -> NonZeroUsize { self.capacity }

    /// Produce the physical writes for `message`.
    ///
    /// The first write holds the encoded header plus as much body as fits;
    /// every following write is a plain body slice. Slices share the
    /// message's body buffer rather than copying it.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::OversizeRequest`] when the header alone exceeds
    /// the capacity, or any validation error raised by the codec.
    pub fn fragment(&self, message: &Message) -> Result<Vec<Bytes>, EncodeError> {
        let capacity = self.capacity.get();
        let mut head = BytesMut::new();
        codec::encode_head(message, &mut head)?;
        if head.len() > capacity {
            return Err(EncodeError::OversizeRequest {
                size: head.len(),
                capacity,
            });
        }

        let body = message.body().cloned().unwrap_or_default();
        let first = body.len().min(capacity - head.len());
        head.extend_from_slice(&body[..first]);

        let mut frames = Vec::with_capacity(1 + (body.len() - first).div_ceil(capacity));
        frames.push(head.freeze());
        let mut offset = first;
        while offset < body.len() {
            let end = body.len().min(offset + capacity);
            frames.push(body.slice(offset..end));
            offset = end;
        }
        Ok(frames)
    }
}
