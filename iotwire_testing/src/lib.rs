//! Utilities for driving an [`IotApp`](iotwire::IotApp) against in-memory
//! transports during tests.
//!
//! [`MockTransport`] records every write and serves queued inbound bytes;
//! [`MockTransport::pair`] links two mocks so two apps can talk to each
//! other.
//!
//! ```rust
//! use iotwire::{IotApp, Message};
//! use iotwire_testing::{MockTransport, decode_all};
//!
//! # async fn example() {
//! let app = IotApp::default();
//! let transport = MockTransport::new();
//! let session = app.listen(transport.clone());
//! session.send(Message::signal("/led")).await.unwrap();
//! assert_eq!(decode_all(&transport.written_bytes())[0].path(), Some("/led"));
//! # }
//! ```

pub mod helpers;
pub mod logging;
pub mod transport;

pub use helpers::{Collector, chunks_of, decode_all, poll_for, poll_n, wire};
pub use log::Level;
pub use logging::{LoggerHandle, logger};
pub use transport::MockTransport;
