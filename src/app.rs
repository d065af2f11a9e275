//! Application owning registered connections and the shared middleware.
//!
//! [`IotApp`] is configured once, then each accepted transport is registered
//! with [`IotApp::listen`]. Calling [`IotApp::poll`] periodically drives
//! every connection: inbound frames go through the middleware chain, replies
//! resolve pending requests, heartbeats are sent and lost peers are removed.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::{
    config::ProtocolConfig,
    metrics,
    middleware::{Middleware, MiddlewareChain},
    session::{ConnectionId, PollOutcome, Session},
    transport::Transport,
};

/// Callback invoked once when a connection is lost.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use iotwire::app::DisconnectCallback;
///
/// let on_disconnect: Arc<DisconnectCallback> = Arc::new(|id| {
///     println!("{id} went away");
/// });
/// ```
pub type DisconnectCallback = dyn Fn(ConnectionId) + Send + Sync;

/// Registry of connections sharing one configuration and middleware chain.
pub struct IotApp {
    config: ProtocolConfig,
    chain: MiddlewareChain,
    on_disconnect: Option<Arc<DisconnectCallback>>,
    sessions: DashMap<ConnectionId, Session>,
    next_id: AtomicU64,
}

impl Default for IotApp {
    fn default() -> Self { Self::new(ProtocolConfig::default()) }
}

impl IotApp {
    /// Create an app applying `config` to every connection.
    #[must_use]
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            chain: MiddlewareChain::new(),
            on_disconnect: None,
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append `middleware` to the chain run for every inbound request.
    ///
    /// Middleware runs in registration order.
    #[must_use]
    pub fn wrap(mut self, middleware: impl Middleware) -> Self {
        self.chain.push(middleware);
        self
    }

    /// Register a callback for lost connections.
    ///
    /// It runs once per connection when the transport disconnects or the
    /// peer stops answering heartbeats, but not after [`Session::reset`].
    #[must_use]
    pub fn on_disconnect<F>(mut self, callback: F) -> Self
    where
        F: Fn(ConnectionId) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn config(&self) -> &ProtocolConfig { &self.config }

    /// Register `transport` as a new connection.
    pub fn listen(&self, transport: impl Transport) -> Session {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Session::new(id, Box::new(transport), self.config);
        self.sessions.insert(id, session.clone());
        metrics::inc_connections();
        tracing::info!(connection = %id, "connection registered");
        session
    }

    /// Look up a registered connection.
    #[must_use]
    pub fn session(&self, id: ConnectionId) -> Option<Session> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize { self.sessions.len() }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.sessions.is_empty() }

    /// Reset and forget every connection. No disconnect callbacks run.
    pub async fn reset_clients(&self) {
        for session in self.snapshot() {
            session.reset().await;
            self.forget(session.id());
        }
    }

    /// Poll every connection once.
    ///
    /// Connections that were reset are forgotten; lost connections are
    /// forgotten and reported to the disconnect callback.
    pub async fn poll(&self) {
        for session in self.snapshot() {
            match session.poll(&self.chain).await {
                PollOutcome::Open => {}
                PollOutcome::Reset => {
                    self.forget(session.id());
                }
                PollOutcome::Lost => {
                    if self.forget(session.id())
                        && let Some(callback) = &self.on_disconnect
                    {
                        callback(session.id());
                    }
                }
            }
        }
    }

    fn snapshot(&self) -> Vec<Session> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn forget(&self, id: ConnectionId) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        if removed {
            metrics::dec_connections();
            tracing::debug!(connection = %id, "connection removed");
        }
        removed
    }
}

