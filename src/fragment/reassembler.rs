//! Inbound helper that stitches body fragments back into complete messages.
//!
//! [`Reassembler`] tracks how many body bytes have arrived against the
//! length declared by the first fragment. Once a fragment leaves a message
//! incomplete, every following byte on the connection belongs to that
//! message until the declared length is reached, so at most one message is
//! in flight at a time. It is evicted when no fragment arrives within the
//! configured timeout.

use bytes::BytesMut;
use tokio::time::{Duration, Instant};

use crate::message::{Message, Method};

#[derive(Debug)]
struct PartialMessage {
    message: Message,
    buffer: BytesMut,
    deadline: Instant,
}

impl PartialMessage {
    fn remaining(&self) -> usize {
        self.message
            .total_body_length()
            .saturating_sub(self.buffer.len())
    }

    fn into_message(self) -> Message {
        let Self {
            mut message,
            buffer,
            ..
        } = self;
        let total = message.total_body_length();
        message.set_fragment(buffer.freeze(), total);
        message
    }
}

/// Per-connection multi-part tracking.
#[derive(Debug)]
pub struct Reassembler {
    timeout: Duration,
    partial: Option<PartialMessage>,
}

impl Reassembler {
    /// Create a reassembler that extends the deadline by `timeout` on every
    /// fragment.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            partial: None,
        }
    }

    /// Start tracking `message`, whose body holds the first fragment.
    ///
    /// Returns the message untouched if it is already complete. The buffer
    /// only grows as body bytes arrive; the declared length is never
    /// reserved up front.
    pub fn begin(&mut self, message: Message, now: Instant) -> Option<Message> {
        if message.is_complete() {
            return Some(message);
        }
        let id = message.id();
        let buffer = message
            .body()
            .map_or_else(BytesMut::new, |fragment| BytesMut::from(&fragment[..]));
        let partial = PartialMessage {
            message,
            buffer,
            deadline: now + self.timeout,
        };
        if let Some(previous) = self.partial.replace(partial) {
            tracing::warn!(id = previous.message.id(), "replacing unfinished multi-part message");
        }
        tracing::trace!(id, "multi-part message started");
        None
    }

    /// Id and method of the message that continuation bytes belong to.
    #[must_use]
    pub fn active(&self) -> Option<(u16, Method)> {
        self.partial
            .as_ref()
            .map(|partial| (partial.message.id(), partial.message.method()))
    }

    /// Body bytes still expected by the active message.
    #[must_use]
    pub fn remaining(&self) -> Option<usize> { self.partial.as_ref().map(PartialMessage::remaining) }

    /// Feed continuation bytes to the active message.
    ///
    /// Consumes at most the bytes still owed to the active message and
    /// returns how many were taken, plus the message if it is now complete.
    /// Bytes beyond the returned count belong to the next frame.
    pub fn feed(&mut self, src: &[u8], now: Instant) -> (usize, Option<Message>) {
        let Some(partial) = self.partial.as_mut() else {
            return (0, None);
        };

        let take = src.len().min(partial.remaining());
        partial.buffer.extend_from_slice(&src[..take]);
        partial.deadline = now + self.timeout;
        if partial.remaining() > 0 {
            return (take, None);
        }

        (take, self.partial.take().map(PartialMessage::into_message))
    }

    /// Evict the active message if its deadline has passed, returning its id.
    pub fn purge_expired(&mut self, now: Instant) -> Option<u16> {
        let expired = self
            .partial
            .as_ref()
            .is_some_and(|partial| now >= partial.deadline);
        if !expired {
            return None;
        }
        self.partial.take().map(|partial| partial.message.id())
    }

    /// Drop the tracked message.
    pub fn clear(&mut self) { self.partial = None; }

    /// Number of messages currently being reassembled.
    #[must_use]
    pub fn buffered_len(&self) -> usize { usize::from(self.partial.is_some()) }

    #[cfg(test)]
    pub(crate) fn reserved(&self) -> usize { self.partial.as_ref().map_or(0, |partial| partial.buffer.capacity()) }
}
