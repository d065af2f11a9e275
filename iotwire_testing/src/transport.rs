//! In-memory [`Transport`] for driving sessions without sockets.

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use async_trait::async_trait;
use bytes::Bytes;
use iotwire::Transport;

#[derive(Debug)]
struct MockState {
    inbound: VecDeque<u8>,
    written: Vec<Bytes>,
    connected: bool,
    stopped: bool,
    fail_writes: bool,
    peer: Weak<Mutex<MockState>>,
}

impl MockState {
    fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            written: Vec::new(),
            connected: true,
            stopped: false,
            fail_writes: false,
            peer: Weak::new(),
        }
    }
}

/// Transport backed by shared in-memory buffers.
///
/// Clones share state, so a test keeps one clone while the session owns
/// another. Every write call is recorded as one chunk.
#[derive(Clone, Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self { Self::new() }
}

impl MockTransport {
    /// A connected transport with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    /// Two transports where whatever one writes the other reads.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let left = Self::new();
        let right = Self::new();
        left.lock().peer = Arc::downgrade(&right.state);
        right.lock().peer = Arc::downgrade(&left.state);
        (left, right)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> { self.state.lock().expect("mock transport poisoned") }

    /// Queue bytes for the session to read.
    pub fn push_inbound(&self, bytes: &[u8]) { self.lock().inbound.extend(bytes); }

    /// Whether queued inbound bytes remain unread.
    #[must_use]
    pub fn has_inbound(&self) -> bool { !self.lock().inbound.is_empty() }

    /// Every chunk written so far, one entry per write call.
    #[must_use]
    pub fn written(&self) -> Vec<Bytes> { self.lock().written.clone() }

    /// Everything written so far, concatenated.
    #[must_use]
    pub fn written_bytes(&self) -> Vec<u8> {
        self.lock().written.iter().flat_map(|chunk| chunk.iter().copied()).collect()
    }

    /// Drain the recorded writes.
    pub fn take_written(&self) -> Vec<Bytes> { std::mem::take(&mut self.lock().written) }

    /// Make the transport report a lost connection.
    pub fn disconnect(&self) { self.lock().connected = false; }

    /// Make subsequent writes fail with a broken pipe.
    pub fn fail_writes(&self) { self.lock().fail_writes = true; }

    /// Whether the session stopped the transport.
    #[must_use]
    pub fn is_stopped(&self) -> bool { self.lock().stopped }
}

#[async_trait]
impl Transport for MockTransport {
    fn available(&mut self) -> usize { self.lock().inbound.len() }

    fn read(&mut self) -> Option<u8> { self.lock().inbound.pop_front() }

    async fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let peer = {
            let mut state = self.lock();
            if state.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
            }
            state.written.push(Bytes::copy_from_slice(bytes));
            state.peer.upgrade()
        };
        if let Some(peer) = peer {
            peer.lock().expect("mock transport poisoned").inbound.extend(bytes);
        }
        Ok(bytes.len())
    }

    fn connected(&self) -> bool { self.lock().connected }

    async fn stop(&mut self) {
        let mut state = self.lock();
        state.stopped = true;
        state.connected = false;
    }
}
