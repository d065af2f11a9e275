//! Per-connection protocol state and the send and poll paths.
//!
//! A [`Session`] wraps one [`Transport`] together with the state the
//! protocol keeps for it: the correlation table, the multi-part reassembler,
//! the heartbeat controller, negotiated frame capacities and any bytes left
//! over from the previous read. Sessions are cheap to clone; clones share the
//! same connection.
//!
//! Inbound processing is split in two. [`SessionState::ingest`] is a
//! synchronous state machine turning bytes into [`Inbound`] events while the
//! state lock is held. The async [`Session::poll`] then acts on those events
//! with the lock released, so callbacks and middleware are free to send on
//! the same session.

use std::{fmt, num::NonZeroUsize, sync::Arc};

use bytes::{Buf, Bytes, BytesMut};
use tokio::{
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::{
    alive::AliveController,
    codec::{self, EncodeError, FramingError},
    config::ProtocolConfig,
    correlation::{CorrelationTable, Expect, Expired, Resolved},
    error::SendError,
    fragment::{self, Fragmenter, Reassembler},
    message::{Message, Method},
    metrics::{self, Direction},
    middleware::{MiddlewareChain, Request},
    negotiation,
    transport::{self, Transport},
};

/// Identifier assigned to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub const fn as_u64(self) -> u64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "connection {}", self.0) }
}

/// What a poll left the session as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The connection is usable.
    Open,
    /// The session was reset locally and should be forgotten.
    Reset,
    /// The transport disconnected or the peer stopped answering heartbeats.
    Lost,
}

/// Work produced by [`SessionState::ingest`] to be carried out with the
/// state lock released.
pub(crate) enum Inbound {
    /// Hand to the middleware chain.
    Dispatch(Message),
    /// Reply matched a pending request.
    Resolved(Resolved),
    /// Peer probe awaiting an `ALIVE_RESPONSE` with this id.
    AliveRequested(u16),
    /// Peer asked for this capacity, which is already adopted.
    BufferSizeRequested(usize),
}

impl fmt::Debug for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispatch(message) => f.debug_tuple("Dispatch").field(message).finish(),
            Self::Resolved(resolved) => f.debug_tuple("Resolved").field(&resolved.message).finish(),
            Self::AliveRequested(id) => f.debug_tuple("AliveRequested").field(id).finish(),
            Self::BufferSizeRequested(n) => f.debug_tuple("BufferSizeRequested").field(n).finish(),
        }
    }
}

/// Outcome of one housekeeping pass.
pub(crate) struct Sweep {
    pub(crate) expired: Vec<Expired>,
    pub(crate) peer_lost: bool,
    pub(crate) probe_due: bool,
}

/// Synchronous protocol state of one connection.
#[derive(Debug)]
pub(crate) struct SessionState {
    connection: ConnectionId,
    correlation: CorrelationTable,
    reassembler: Reassembler,
    leftover: BytesMut,
    leftover_since: Option<Instant>,
    alive: AliveController,
    outbound_capacity: usize,
    inbound_capacity: usize,
    multipart_timeout: Duration,
    closed: bool,
}

impl SessionState {
    pub(crate) fn new(connection: ConnectionId, config: &ProtocolConfig, now: Instant) -> Self {
        let capacity = negotiation::clamp_capacity(config.default_capacity);
        Self {
            connection,
            correlation: CorrelationTable::new(config.response_timeout),
            reassembler: Reassembler::new(config.multipart_timeout),
            leftover: BytesMut::new(),
            leftover_since: None,
            alive: AliveController::new(config.alive_interval, now),
            outbound_capacity: capacity,
            inbound_capacity: capacity,
            multipart_timeout: config.multipart_timeout,
            closed: false,
        }
    }

    fn fragmenter(&self) -> Fragmenter {
        Fragmenter::new(NonZeroUsize::new(self.outbound_capacity).unwrap_or(NonZeroUsize::MIN))
    }

    /// Bytes the next read may pull without overflowing the inbound buffer.
    pub(crate) fn read_budget(&self) -> usize {
        self.inbound_capacity.saturating_sub(self.leftover.len())
    }

    /// Append `incoming` to the leftover buffer and decode everything that
    /// is now complete.
    pub(crate) fn ingest(&mut self, incoming: &[u8], now: Instant) -> Vec<Inbound> {
        self.leftover.extend_from_slice(incoming);
        let mut events = Vec::new();
        while !self.leftover.is_empty() {
            if let Some((id, method)) = self.reassembler.active() {
                let (taken, completed) = self.reassembler.feed(&self.leftover, now);
                if taken == 0 && completed.is_none() {
                    break;
                }
                self.leftover.advance(taken);
                self.alive.touch(now);
                if method.resolves_pending() {
                    self.correlation.extend(id, now);
                }
                if let Some(message) = completed {
                    self.complete(message, &mut events);
                }
                continue;
            }

            match codec::decode(&self.leftover) {
                Ok(Some(frame)) => {
                    let parts = fragment::parts_for(frame.frame_len(), self.inbound_capacity);
                    self.leftover.advance(frame.consumed);
                    self.leftover_since = None;
                    self.alive.touch(now);
                    metrics::inc_frames(Direction::Inbound);

                    let mut message = frame.message;
                    message.set_parts(parts);
                    tracing::trace!(
                        connection = %self.connection,
                        id = message.id(),
                        method = %message.method(),
                        parts,
                        "frame decoded"
                    );
                    if !message.is_complete() && message.method().resolves_pending() {
                        self.correlation.extend(message.id(), now);
                    }
                    if let Some(message) = self.reassembler.begin(message, now) {
                        self.complete(message, &mut events);
                    }
                }
                Ok(None) => {
                    if self.leftover.len() >= self.inbound_capacity {
                        let error = FramingError::IncompleteHeader {
                            have: self.leftover.len(),
                            capacity: self.inbound_capacity,
                        };
                        self.discard(&error);
                    } else {
                        self.leftover_since.get_or_insert(now);
                    }
                    break;
                }
                Err(error) => {
                    self.discard(&error);
                    break;
                }
            }
        }
        events
    }

    fn complete(&mut self, message: Message, events: &mut Vec<Inbound>) {
        let method = message.method();
        match method {
            Method::AliveRequest => {
                events.push(Inbound::AliveRequested(message.id()));
                return;
            }
            Method::BufferSizeRequest => {
                match negotiation::read_capacity(&message) {
                    Ok(capacity) => {
                        self.outbound_capacity = capacity;
                        self.inbound_capacity = capacity;
                        tracing::debug!(connection = %self.connection, capacity, "peer set frame capacity");
                        events.push(Inbound::BufferSizeRequested(capacity));
                    }
                    Err(error) => self.reject(&error),
                }
                return;
            }
            Method::BufferSizeResponse => {
                match negotiation::read_capacity(&message) {
                    Ok(capacity) => {
                        self.outbound_capacity = capacity;
                        self.inbound_capacity = capacity;
                        tracing::debug!(connection = %self.connection, capacity, "peer accepted frame capacity");
                    }
                    Err(error) => self.reject(&error),
                }
                return;
            }
            _ => {}
        }

        if method.resolves_pending() {
            let id = message.id();
            match self.correlation.resolve(message) {
                Ok(resolved) => {
                    self.alive.acknowledge(id);
                    tracing::debug!(connection = %self.connection, id, %method, "reply matched");
                    events.push(Inbound::Resolved(resolved));
                }
                Err(message) if method.is_response() => {
                    tracing::debug!(
                        connection = %self.connection,
                        id = message.id(),
                        %method,
                        "dropping reply with no pending request"
                    );
                }
                Err(message) => events.push(Inbound::Dispatch(message)),
            }
            return;
        }
        events.push(Inbound::Dispatch(message));
    }

    fn discard(&mut self, error: &FramingError) {
        tracing::warn!(
            connection = %self.connection,
            %error,
            dropped = self.leftover.len(),
            "discarding malformed input"
        );
        metrics::inc_errors("malformed");
        self.leftover.clear();
        self.leftover_since = None;
    }

    fn reject(&self, error: &dyn std::error::Error) {
        tracing::warn!(connection = %self.connection, %error, "ignoring invalid negotiation message");
        metrics::inc_errors("malformed");
    }

    /// Expire overdue entries and decide whether a probe is due.
    pub(crate) fn sweep(&mut self, now: Instant) -> Sweep {
        let mut expired = self.correlation.sweep(now);
        let mut peer_lost = false;
        if let Some(probe) = self.alive.outstanding()
            && let Some(position) = expired.iter().position(|e| e.id == probe)
        {
            expired.remove(position);
            peer_lost = true;
        }
        for entry in &expired {
            tracing::warn!(
                connection = %self.connection,
                id = entry.id,
                method = %entry.request.method(),
                "request timed out"
            );
            metrics::inc_errors("timeout");
        }

        if let Some(id) = self.reassembler.purge_expired(now) {
            tracing::warn!(connection = %self.connection, id, "multi-part message timed out");
            metrics::inc_errors("timeout");
        }

        if let Some(since) = self.leftover_since
            && now >= since + self.multipart_timeout
        {
            let error = FramingError::StaleHeader {
                have: self.leftover.len(),
            };
            self.discard(&error);
        }

        let probe_due = !peer_lost && self.alive.due(now);
        Sweep {
            expired,
            peer_lost,
            probe_due,
        }
    }

    /// Drop everything tracked for the connection and mark it closed.
    pub(crate) fn close(&mut self, now: Instant) {
        self.correlation.clear();
        self.reassembler.clear();
        self.leftover = BytesMut::new();
        self.leftover_since = None;
        self.alive.reset(now);
        self.closed = true;
    }
}

struct SessionInner {
    id: ConnectionId,
    config: ProtocolConfig,
    transport: Mutex<Box<dyn Transport>>,
    state: Mutex<SessionState>,
}

/// Handle to one registered connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Wrap `transport` with fresh protocol state.
    #[must_use]
    pub fn new(id: ConnectionId, transport: Box<dyn Transport>, config: ProtocolConfig) -> Self {
        let state = SessionState::new(id, &config, Instant::now());
        Self {
            inner: Arc::new(SessionInner {
                id,
                config,
                transport: Mutex::new(transport),
                state: Mutex::new(state),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId { self.inner.id }

    #[must_use]
    pub fn config(&self) -> &ProtocolConfig { &self.inner.config }

    /// Send `message` without waiting for a reply.
    ///
    /// Methods that carry an id get a fresh one when the message has none.
    /// Returns the id the message went out with (zero for id-less methods).
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if the message cannot be encoded, the session is
    /// closed or the transport fails.
    pub async fn send(&self, message: Message) -> Result<u16, SendError> {
        self.send_with(message, None).await
    }

    /// Send `message` and register `expect` for its reply.
    ///
    /// The expectation is only recorded for methods that expect a reply;
    /// for anything else this behaves like [`Session::send`].
    ///
    /// # Errors
    ///
    /// As for [`Session::send`]. No callback runs when an error is returned.
    pub async fn request(&self, message: Message, expect: Expect) -> Result<u16, SendError> {
        self.send_with(message, Some(expect)).await
    }

    /// Send `reply` under the id of `to`, typically a `RESPONSE` answering
    /// a peer `REQUEST`.
    ///
    /// # Errors
    ///
    /// As for [`Session::send`]. Answering an id-less message fails with
    /// [`EncodeError::MissingId`].
    pub async fn respond(&self, to: &Message, mut reply: Message) -> Result<u16, SendError> {
        if reply.method().carries_id() && to.id() == 0 {
            return Err(EncodeError::MissingId {
                method: reply.method(),
            }
            .into());
        }
        reply.set_id(to.id());
        self.send(reply).await
    }

    /// Send a heartbeat probe now.
    ///
    /// The session is torn down if no `ALIVE_RESPONSE` arrives within the
    /// response timeout.
    ///
    /// # Errors
    ///
    /// As for [`Session::send`].
    pub async fn alive(&self) -> Result<u16, SendError> {
        let (frames, id) = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(SendError::ConnectionClosed(self.id()));
            }
            let id = state
                .correlation
                .allocate_id()
                .ok_or(SendError::IdsExhausted)?;
            let probe = Message::new(Method::AliveRequest).with_id(id);
            let frames = state.fragmenter().fragment(&probe)?;
            let now = Instant::now();
            state.correlation.register(probe, Expect::new(), now);
            state.alive.probe_sent(id, now);
            (frames, id)
        };
        tracing::debug!(connection = %self.id(), id, "sending heartbeat probe");
        self.write_frames(&frames).await?;
        Ok(id)
    }

    /// Ask the peer to use frames of up to `capacity` bytes.
    ///
    /// The local inbound buffer grows immediately so the peer's larger
    /// frames fit; outbound frames keep the old size until the peer
    /// answers.
    ///
    /// # Errors
    ///
    /// As for [`Session::send`].
    pub async fn request_buffer_size(&self, capacity: usize) -> Result<(), SendError> {
        let capacity = negotiation::clamp_capacity(capacity);
        {
            let mut state = self.inner.state.lock().await;
            state.inbound_capacity = state.inbound_capacity.max(capacity);
        }
        self.send(negotiation::buffer_size_request(capacity))
            .await
            .map(|_| ())
    }

    /// Largest physical frame this session writes.
    pub async fn capacity(&self) -> usize { self.inner.state.lock().await.outbound_capacity }

    /// Largest chunk this session reads in one poll.
    pub async fn inbound_capacity(&self) -> usize {
        self.inner.state.lock().await.inbound_capacity
    }

    /// Requests still awaiting a reply, heartbeat probes included.
    pub async fn pending_requests(&self) -> usize { self.inner.state.lock().await.correlation.len() }

    /// Inbound messages still being reassembled.
    pub async fn partial_messages(&self) -> usize {
        self.inner.state.lock().await.reassembler.buffered_len()
    }

    /// Whether the session was reset or lost.
    pub async fn is_closed(&self) -> bool { self.inner.state.lock().await.closed }

    /// Stop the transport and drop all pending state without notifying
    /// anyone. The owning app forgets the session on its next poll.
    pub async fn reset(&self) {
        self.close().await;
        tracing::info!(connection = %self.id(), "session reset");
    }

    async fn close(&self) {
        self.inner.state.lock().await.close(Instant::now());
        self.inner.transport.lock().await.stop().await;
    }

    async fn send_with(&self, mut message: Message, expect: Option<Expect>) -> Result<u16, SendError> {
        let method = message.method();
        let (frames, id, registered) = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(SendError::ConnectionClosed(self.id()));
            }
            if method.expects_reply() && message.id() == 0 {
                let id = state
                    .correlation
                    .allocate_id()
                    .ok_or(SendError::IdsExhausted)?;
                message.set_id(id);
            }
            let frames = state.fragmenter().fragment(&message)?;
            let id = message.id();
            let registered = match expect {
                Some(expect) if method.expects_reply() => {
                    state.correlation.register(message, expect, Instant::now());
                    true
                }
                Some(_) => {
                    tracing::debug!(%method, "ignoring reply expectation for a method without replies");
                    false
                }
                None => false,
            };
            (frames, id, registered)
        };

        if frames.len() > 1 {
            tracing::debug!(connection = %self.id(), id, %method, parts = frames.len(), "multi-part send");
        }
        if let Err(error) = self.write_frames(&frames).await {
            if registered {
                self.inner.state.lock().await.correlation.cancel(id);
            }
            return Err(error);
        }
        Ok(id)
    }

    async fn write_frames(&self, frames: &[Bytes]) -> Result<(), SendError> {
        let mut transport = self.inner.transport.lock().await;
        if !transport.connected() {
            return Err(SendError::ConnectionClosed(self.id()));
        }
        for (index, frame) in frames.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.inner.config.pacing_delay).await;
            }
            transport::write_all(&mut **transport, frame).await?;
            metrics::inc_frames(Direction::Outbound);
        }
        Ok(())
    }

    /// Read what the transport has buffered, act on it and run housekeeping.
    ///
    /// Does nothing but housekeeping while another task is writing.
    pub async fn poll(&self, chain: &MiddlewareChain) -> PollOutcome {
        let now = Instant::now();
        let (events, connected) = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return PollOutcome::Reset;
            }
            let mut incoming = BytesMut::new();
            let connected = match self.inner.transport.try_lock() {
                Ok(mut transport) => {
                    let budget = state.read_budget();
                    if budget > 0 && transport.available() > 0 {
                        transport.read_available(budget, &mut incoming);
                    }
                    transport.connected()
                }
                Err(_) => true,
            };
            (state.ingest(&incoming, now), connected)
        };

        for event in events {
            self.handle(event, chain).await;
        }

        if !connected {
            tracing::info!(connection = %self.id(), "transport disconnected");
            self.close().await;
            return PollOutcome::Lost;
        }

        let sweep = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return PollOutcome::Reset;
            }
            state.sweep(Instant::now())
        };
        for expired in sweep.expired {
            expired.run();
        }
        if sweep.peer_lost {
            tracing::warn!(connection = %self.id(), "peer did not answer heartbeat");
            metrics::inc_errors("peer_unresponsive");
            self.close().await;
            return PollOutcome::Lost;
        }
        if sweep.probe_due
            && let Err(error) = self.alive().await
        {
            tracing::warn!(connection = %self.id(), %error, "heartbeat probe failed");
        }
        PollOutcome::Open
    }

    async fn handle(&self, event: Inbound, chain: &MiddlewareChain) {
        match event {
            Inbound::Dispatch(message) => chain.dispatch(Request::new(message, self.clone())).await,
            Inbound::Resolved(resolved) => resolved.run(),
            Inbound::AliveRequested(id) => {
                let reply = Message::new(Method::AliveResponse).with_id(id);
                if let Err(error) = self.send(reply).await {
                    tracing::warn!(connection = %self.id(), id, %error, "heartbeat reply failed");
                }
            }
            Inbound::BufferSizeRequested(capacity) => {
                if let Err(error) = self.send(negotiation::buffer_size_response(capacity)).await {
                    tracing::warn!(connection = %self.id(), %error, "buffer size reply failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
