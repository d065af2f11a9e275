//! Helpers for building wire bytes and driving apps in tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use iotwire::{IotApp, Message, Middleware, Next, Request, codec};

/// Encode `message` as one contiguous frame.
///
/// # Panics
///
/// Panics if the message cannot be encoded.
#[must_use]
pub fn wire(message: &Message) -> Vec<u8> {
    codec::encode(message)
        .expect("message should encode")
        .to_vec()
}

/// Split `bytes` at the given cut points, which are clamped and sorted.
#[must_use]
pub fn chunks_of(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = cuts.iter().map(|&cut| cut.min(bytes.len())).collect();
    cuts.sort_unstable();
    cuts.dedup();
    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        chunks.push(bytes[start..cut].to_vec());
        start = cut;
    }
    chunks.push(bytes[start..].to_vec());
    chunks.retain(|chunk| !chunk.is_empty());
    chunks
}

/// Decode every complete frame in `bytes`.
///
/// # Panics
///
/// Panics if the bytes contain a malformed or truncated frame.
#[must_use]
pub fn decode_all(mut bytes: &[u8]) -> Vec<Message> {
    let mut messages = Vec::new();
    while !bytes.is_empty() {
        let frame = codec::decode(bytes)
            .expect("written bytes should decode")
            .expect("written bytes should hold a whole header");
        assert!(frame.message.is_complete(), "truncated body in written bytes");
        bytes = &bytes[frame.consumed..];
        messages.push(frame.message);
    }
    messages
}

/// Poll `app` `times` times without advancing time.
pub async fn poll_n(app: &IotApp, times: usize) {
    for _ in 0..times {
        app.poll().await;
    }
}

/// Poll `app` while advancing the paused clock by `step` until `total` has
/// elapsed.
///
/// Only meaningful inside a test running with `start_paused = true`.
pub async fn poll_for(app: &IotApp, total: Duration, step: Duration) {
    let mut elapsed = Duration::ZERO;
    app.poll().await;
    while elapsed < total {
        tokio::time::advance(step).await;
        elapsed += step;
        app.poll().await;
    }
}

/// Middleware recording every request it sees before passing it on.
#[derive(Clone, Debug, Default)]
pub struct Collector {
    seen: Arc<Mutex<Vec<Message>>>,
}

impl Collector {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Messages seen so far, in arrival order.
    ///
    /// # Panics
    ///
    /// Panics if a handler panicked while recording.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> { self.seen.lock().expect("collector poisoned").clone() }
}

#[async_trait]
impl Middleware for Collector {
    async fn handle(&self, request: &mut Request, next: Next<'_>) {
        self.seen
            .lock()
            .expect("collector poisoned")
            .push(request.message().clone());
        next.run(request).await;
    }
}
