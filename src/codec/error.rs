//! Error types for the frame codec.
//!
//! - [`FramingError`]: inbound bytes that cannot be a valid frame. The
//!   connection drops the offending bytes and keeps going.
//! - [`EncodeError`]: an outbound message that cannot be put on the wire.
//!   Reported to the caller before any byte is written.

use thiserror::Error;

use crate::message::Method;

/// Structural problems found while decoding a frame.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The method code in the second control byte is not known.
    #[error("unknown method code: {code}")]
    UnknownMethod {
        /// Code that was not recognised.
        code: u8,
    },

    /// A header key ran into a terminator before its separator.
    #[error("header {index} has no key/value separator")]
    MissingSeparator {
        /// Zero-based position of the broken header.
        index: usize,
    },

    /// A text field was not valid UTF-8.
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Field that failed to decode.
        field: &'static str,
    },

    /// A method that requires a correlation id arrived without one.
    #[error("{method} frame without correlation id")]
    MissingId {
        /// Method of the frame.
        method: Method,
    },

    /// The reserved id 0 appeared on the wire.
    #[error("correlation id 0 is reserved")]
    ZeroId,

    /// The frame header does not fit the connection's inbound capacity.
    #[error("incomplete frame header: have {have} bytes, capacity {capacity}")]
    IncompleteHeader {
        /// Bytes buffered so far.
        have: usize,
        /// Inbound capacity of the connection.
        capacity: usize,
    },

    /// A partial header waited longer than the fragment timeout.
    #[error("partial frame header of {have} bytes timed out")]
    StaleHeader {
        /// Bytes buffered when the header was discarded.
        have: usize,
    },
}

/// Reasons an outbound message cannot be encoded.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// More headers than the one-byte count can describe.
    #[error("too many headers: {count} > {max}")]
    TooManyHeaders {
        /// Headers on the message.
        count: usize,
        /// Protocol maximum.
        max: usize,
    },

    /// Path and headers alone exceed the negotiated frame capacity.
    #[error("request header of {size} bytes exceeds frame capacity {capacity}")]
    OversizeRequest {
        /// Encoded size of everything before the body.
        size: usize,
        /// Frame capacity of the connection.
        capacity: usize,
    },

    /// The body is longer than the method's length field can express.
    #[error("{method} body of {size} bytes exceeds {max}")]
    BodyTooLarge {
        /// Method deciding the length-field width.
        method: Method,
        /// Body length.
        size: usize,
        /// Largest body the field can express.
        max: usize,
    },

    /// The method needs a non-zero correlation id.
    #[error("{method} requires a non-zero correlation id")]
    MissingId {
        /// Method of the message.
        method: Method,
    },

    /// The version does not fit six bits.
    #[error("protocol version {version} exceeds {max}")]
    InvalidVersion {
        /// Requested version.
        version: u8,
        /// Largest encodable version.
        max: u8,
    },

    /// The path contains the field terminator.
    #[error("path contains the terminator byte")]
    InvalidPath,

    /// A header key or value contains a reserved delimiter.
    #[error("header {key:?} contains a reserved delimiter")]
    InvalidHeader {
        /// Offending header key.
        key: String,
    },
}

impl EncodeError {
    /// Whether the error means the message is too large for the wire.
    #[must_use]
    pub fn is_oversize(&self) -> bool {
        matches!(
            self,
            Self::TooManyHeaders { .. } | Self::OversizeRequest { .. } | Self::BodyTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(EncodeError::TooManyHeaders { count: 256, max: 255 }, true)]
    #[case(EncodeError::OversizeRequest { size: 2000, capacity: 1024 }, true)]
    #[case(
        EncodeError::BodyTooLarge { method: Method::Signal, size: 300, max: 255 },
        true
    )]
    #[case(EncodeError::MissingId { method: Method::Request }, false)]
    #[case(EncodeError::InvalidPath, false)]
    fn oversize_classification(#[case] error: EncodeError, #[case] oversize: bool) {
        assert_eq!(error.is_oversize(), oversize);
    }

    #[test]
    fn framing_errors_render_context() {
        let error = FramingError::UnknownMethod { code: 42 };
        assert_eq!(error.to_string(), "unknown method code: 42");
        let error = FramingError::MissingId {
            method: Method::Response,
        };
        assert_eq!(error.to_string(), "RESPONSE frame without correlation id");
    }
}
