//! Byte-stream transports consumed by the protocol engine.
//!
//! The engine never assumes frame boundaries line up with transport reads.
//! It only asks how many bytes are buffered, pulls them one at a time, and
//! writes whole chunks. [`TcpTransport`] adapts a Tokio `TcpStream` to this
//! shape using non-blocking reads.

use std::io;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, ToSocketAddrs},
};

/// Socket-like client the engine reads from and writes to.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Bytes that can be read right now without waiting.
    fn available(&mut self) -> usize;

    /// Read one buffered byte.
    fn read(&mut self) -> Option<u8>;

    /// Write `bytes`, returning how many were accepted.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the write fails.
    async fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Whether the peer is still connected.
    fn connected(&self) -> bool;

    /// Close the connection.
    async fn stop(&mut self);

    /// Move up to `max` buffered bytes into `dst`, returning the count.
    fn read_available(&mut self, max: usize, dst: &mut BytesMut) -> usize {
        let mut read = 0;
        while read < max && self.available() > 0 {
            let Some(byte) = self.read() else { break };
            dst.extend_from_slice(&[byte]);
            read += 1;
        }
        read
    }
}

/// Write all of `bytes`, retrying short writes.
///
/// # Errors
///
/// Returns [`io::ErrorKind::WriteZero`] if the transport stops accepting
/// bytes, or any error reported by the transport.
pub async fn write_all(transport: &mut dyn Transport, mut bytes: &[u8]) -> io::Result<()> {
    while !bytes.is_empty() {
        let written = transport.write(bytes).await?;
        if written == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "transport accepted no bytes",
            ));
        }
        bytes = bytes.get(written..).unwrap_or_default();
    }
    Ok(())
}

const READ_CHUNK: usize = 1024;

/// [`Transport`] over a Tokio TCP stream.
///
/// Reads use `try_read`, so `available` reports only what the socket already
/// holds and never waits.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    stash: BytesMut,
    open: bool,
}

impl TcpTransport {
    /// Wrap an established stream.
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            stash: BytesMut::with_capacity(READ_CHUNK),
            open: true,
        }
    }

    /// Connect to `addr`.
    ///
    /// # Errors
    ///
    /// Returns any error raised while connecting.
    pub async fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    fn fill(&mut self) {
        if !self.open {
            return;
        }
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.try_read(&mut chunk) {
                Ok(0) => {
                    tracing::debug!("peer closed the TCP stream");
                    self.open = false;
                    break;
                }
                Ok(n) => self.stash.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(error = %e, "TCP read failed");
                    self.open = false;
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn available(&mut self) -> usize {
        self.fill();
        self.stash.len()
    }

    fn read(&mut self) -> Option<u8> {
        if self.stash.is_empty() {
            self.fill();
        }
        if self.stash.is_empty() {
            return None;
        }
        Some(self.stash.get_u8())
    }

    async fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.stream.write_all(bytes).await?;
        Ok(bytes.len())
    }

    fn connected(&self) -> bool { self.open }

    async fn stop(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(error = %e, "TCP shutdown failed");
        }
        self.open = false;
    }

    fn read_available(&mut self, max: usize, dst: &mut BytesMut) -> usize {
        self.fill();
        let take = max.min(self.stash.len());
        dst.extend_from_slice(&self.stash.split_to(take));
        take
    }
}
