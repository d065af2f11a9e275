//! Ordered middleware chain for inbound requests.
//!
//! Each [`Middleware`] receives the decoded [`Request`] and a [`Next`]
//! continuation. Calling [`Next::run`] hands the request to the following
//! middleware; returning without calling it short-circuits the chain. The
//! chain owns the request and drops it once after the outermost call
//! returns, releasing the message buffers exactly once.

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::{message::Message, session::Session};

/// A decoded inbound message together with the connection it arrived on.
#[derive(Debug)]
pub struct Request {
    message: Message,
    session: Session,
}

impl Request {
    /// Pair `message` with the `session` it was received on.
    #[must_use]
    pub fn new(message: Message, session: Session) -> Self { Self { message, session } }

    #[must_use]
    pub fn message(&self) -> &Message { &self.message }

    /// Mutable access so middleware can annotate the message for later
    /// handlers.
    pub fn message_mut(&mut self) -> &mut Message { &mut self.message }

    /// Connection the request arrived on, for sending replies.
    #[must_use]
    pub fn session(&self) -> &Session { &self.session }

    /// Shorthand for [`Message::header`].
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> { self.message.header(key) }
}

/// A request handler taking part in the chain.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Handle `request`, optionally passing it on through `next`.
    async fn handle(&self, request: &mut Request, next: Next<'_>);
}

/// Continuation invoking the rest of the chain.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    /// Continuation over `rest`.
    #[must_use]
    pub const fn new(rest: &'a [Arc<dyn Middleware>]) -> Self { Self { rest } }

    /// Invoke the next middleware. Does nothing at the end of the chain.
    pub async fn run(self, request: &mut Request) {
        if let Some((head, tail)) = self.rest.split_first() {
            head.handle(request, Next::new(tail)).await;
        }
    }
}

/// Middleware list shared by every connection of an app.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    handlers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Create an empty chain.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Append `middleware`; it runs after everything registered before it.
    pub fn push(&mut self, middleware: impl Middleware) { self.handlers.push(Arc::new(middleware)); }

    /// Number of registered middleware.
    #[must_use]
    pub fn len(&self) -> usize { self.handlers.len() }

    /// Whether no middleware is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.handlers.is_empty() }

    /// Run `request` through the chain and release it.
    pub async fn dispatch(&self, mut request: Request) {
        let id = request.message.id();
        let method = request.message.method();
        Next::new(&self.handlers).run(&mut request).await;
        drop(request);
        tracing::trace!(id, %method, "request released after middleware chain");
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.handlers.len())
            .finish()
    }
}
