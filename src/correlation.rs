//! Pending-response table correlating replies with earlier requests.
//!
//! Each connection owns one [`CorrelationTable`]. Sending a request with an
//! [`Expect`] registers a [`PendingResponse`] under the request's id; a later
//! inbound reply with the same id removes the entry and hands back its
//! callback. Entries that outlive their deadline are swept and their timeout
//! callbacks returned to the caller.
//!
//! Callbacks are never invoked while the table is borrowed; the table only
//! returns them so the connection can run them after releasing its state.

use std::{collections::HashMap, fmt};

use rand::Rng;
use tokio::time::{Duration, Instant};

use crate::message::Message;

/// Callback receiving the reply to a request.
pub type ResponseCallback = Box<dyn FnOnce(Message) + Send + 'static>;

/// Callback receiving the original request after its deadline passed.
pub type TimeoutCallback = Box<dyn FnOnce(Message) + Send + 'static>;

/// Reply expectations attached to an outgoing request.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use iotwire::correlation::Expect;
///
/// let expect = Expect::new()
///     .on_response(|reply| println!("got {:?}", reply.body()))
///     .on_timeout(|request| println!("{:?} timed out", request.path()))
///     .timeout(Duration::from_millis(500));
/// # drop(expect);
/// ```
#[derive(Default)]
pub struct Expect {
    on_response: Option<ResponseCallback>,
    on_timeout: Option<TimeoutCallback>,
    timeout: Duration,
}

impl Expect {
    /// No callbacks and the connection's default timeout.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Run `callback` with the reply.
    #[must_use]
    pub fn on_response(mut self, callback: impl FnOnce(Message) + Send + 'static) -> Self {
        self.on_response = Some(Box::new(callback));
        self
    }

    /// Run `callback` with the original request if no reply arrives in time.
    #[must_use]
    pub fn on_timeout(mut self, callback: impl FnOnce(Message) + Send + 'static) -> Self {
        self.on_timeout = Some(Box::new(callback));
        self
    }

    /// Time to wait for the reply. Zero selects the connection default.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expect")
            .field("on_response", &self.on_response.is_some())
            .field("on_timeout", &self.on_timeout.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A request waiting for its reply.
pub struct PendingResponse {
    on_response: Option<ResponseCallback>,
    on_timeout: Option<TimeoutCallback>,
    deadline: Instant,
    request: Message,
}

impl PendingResponse {
    /// Absolute deadline of the entry.
    #[must_use]
    pub fn deadline(&self) -> Instant { self.deadline }

    /// Snapshot of the request as it was sent.
    #[must_use]
    pub fn request(&self) -> &Message { &self.request }
}

impl fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResponse")
            .field("deadline", &self.deadline)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// A reply matched to its pending entry.
pub struct Resolved {
    /// Callback registered by the sender, if any.
    pub callback: Option<ResponseCallback>,
    /// The reply.
    pub message: Message,
}

impl Resolved {
    /// Hand the reply to its callback.
    pub fn run(self) {
        if let Some(callback) = self.callback {
            callback(self.message);
        }
    }
}

/// An entry removed because its deadline passed.
pub struct Expired {
    /// Id the request was sent with.
    pub id: u16,
    /// Callback registered by the sender, if any.
    pub callback: Option<TimeoutCallback>,
    /// The original request.
    pub request: Message,
}

impl Expired {
    /// Hand the original request to the timeout callback.
    pub fn run(self) {
        if let Some(callback) = self.callback {
            callback(self.request);
        }
    }
}

/// Map from correlation id to the request awaiting its reply.
#[derive(Debug)]
pub struct CorrelationTable {
    base_timeout: Duration,
    entries: HashMap<u16, PendingResponse>,
}

impl CorrelationTable {
    /// Create a table whose entries default to `base_timeout`.
    #[must_use]
    pub fn new(base_timeout: Duration) -> Self {
        Self {
            base_timeout,
            entries: HashMap::new(),
        }
    }

    /// Pick a fresh, non-zero id not used by any live entry.
    ///
    /// Ids are drawn at random and redrawn on collision. Returns `None` only
    /// when every id is taken.
    #[must_use]
    pub fn allocate_id(&self) -> Option<u16> {
        if self.entries.len() >= usize::from(u16::MAX) {
            return None;
        }
        let mut rng = rand::thread_rng();
        loop {
            let id = rng.gen_range(1..=u16::MAX);
            if !self.entries.contains_key(&id) {
                return Some(id);
            }
            tracing::trace!(id, "correlation id collision, drawing again");
        }
    }

    /// Register `request` as waiting for a reply.
    ///
    /// The request must already carry its id.
    pub fn register(&mut self, request: Message, expect: Expect, now: Instant) {
        let timeout = if expect.timeout.is_zero() {
            self.base_timeout
        } else {
            expect.timeout
        };
        let id = request.id();
        let pending = PendingResponse {
            on_response: expect.on_response,
            on_timeout: expect.on_timeout,
            deadline: now + timeout,
            request,
        };
        if self.entries.insert(id, pending).is_some() {
            tracing::warn!(id, "pending request replaced by a new one with the same id");
        }
    }

    #[cfg(test)]
    fn contains(&self, id: u16) -> bool { self.entries.contains_key(&id) }

    #[cfg(test)]
    fn get(&self, id: u16) -> Option<&PendingResponse> { self.entries.get(&id) }

    /// Push the deadline of `id` to `now` plus the base timeout.
    ///
    /// Used while a multi-part reply is still arriving.
    pub fn extend(&mut self, id: u16, now: Instant) -> bool {
        let base = self.base_timeout;
        self.entries
            .get_mut(&id)
            .map(|pending| {
                pending.deadline = pending.deadline.max(now + base);
            })
            .is_some()
    }

    /// Settle the entry matching `message`, if any.
    ///
    /// Returns the message back as `Err` when nothing is waiting for it.
    ///
    /// # Errors
    ///
    /// The unmatched message is returned so the caller can route it
    /// elsewhere.
    pub fn resolve(&mut self, message: Message) -> Result<Resolved, Message> {
        match self.entries.remove(&message.id()) {
            Some(pending) => Ok(Resolved {
                callback: pending.on_response,
                message,
            }),
            None => Err(message),
        }
    }

    /// Remove a pending entry without running any callback.
    pub fn cancel(&mut self, id: u16) -> Option<PendingResponse> { self.entries.remove(&id) }

    /// Remove every entry whose deadline is at or before `now`.
    pub fn sweep(&mut self, now: Instant) -> Vec<Expired> {
        let expired_ids: Vec<u16> = self
            .entries
            .iter()
            .filter(|(_, pending)| now >= pending.deadline)
            .map(|(id, _)| *id)
            .collect();
        expired_ids
            .into_iter()
            .filter_map(|id| {
                self.entries.remove(&id).map(|pending| Expired {
                    id,
                    callback: pending.on_timeout,
                    request: pending.request,
                })
            })
            .collect()
    }

    /// Drop every entry without running callbacks.
    pub fn clear(&mut self) { self.entries.clear(); }

    /// Number of requests awaiting a reply.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether no request is awaiting a reply.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
