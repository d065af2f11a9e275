#![doc(html_root_url = "https://docs.rs/iotwire/latest")]
//! Public API for the `iotwire` library.
//!
//! This crate implements a compact, length-delimited binary protocol for
//! constrained devices: a frame codec, multi-part transfers over small
//! buffers, request/response correlation with timeouts, heartbeats, frame
//! size negotiation and a middleware chain for inbound requests.

pub mod alive;
pub mod app;
pub mod byte_order;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod error;
pub mod fragment;
pub mod message;
pub mod metrics;
pub mod middleware;
pub mod negotiation;
pub mod session;
pub mod transport;

pub use app::IotApp;
pub use codec::{DecodedFrame, EncodeError, FramingError, decode, encode};
pub use config::{ConfigError, ProtocolConfig};
pub use correlation::{CorrelationTable, Expect};
pub use error::SendError;
pub use fragment::{Fragmenter, Reassembler};
pub use message::{Message, Method};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use middleware::{Middleware, MiddlewareChain, Next, Request};
pub use session::{ConnectionId, PollOutcome, Session};
pub use transport::{TcpTransport, Transport};
