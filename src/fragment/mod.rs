//! Splitting outbound messages into physical frames and stitching inbound
//! fragments back together.
//!
//! A message whose encoded form exceeds the connection's frame capacity is
//! written as one header frame followed by headerless body slices. The
//! [`Fragmenter`] produces those writes; the [`Reassembler`] consumes the
//! receiving side's bytes until the declared body length is reached.

pub mod fragmenter;
pub mod reassembler;

pub use fragmenter::Fragmenter;
pub use reassembler::Reassembler;

/// Number of physical frames a logical frame of `frame_len` bytes occupies
/// at `capacity` bytes per write.
#[must_use]
pub fn parts_for(frame_len: usize, capacity: usize) -> usize {
    frame_len.div_ceil(capacity.max(1)).max(1)
}
