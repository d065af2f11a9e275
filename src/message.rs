//! The logical protocol message and its method taxonomy.
//!
//! A [`Message`] owns its path, headers and body. Ownership moves through the
//! engine (decoder, reassembler, correlation table, middleware chain) so the
//! buffers are released exactly once, when the last consumer drops the value.

use std::fmt;

use bytes::Bytes;

/// Protocol version stamped on outgoing messages by default.
pub const DEFAULT_VERSION: u8 = 1;

/// Largest version that fits the six bits reserved in the first control byte.
pub const MAX_VERSION: u8 = 0x3F;

/// Maximum number of headers a message may carry.
pub const MAX_HEADERS: usize = 255;

/// Message kinds understood by the protocol.
///
/// The method decides whether a correlation id is present and how wide the
/// body-length field is on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Method {
    /// Fire-and-forget notification.
    Signal = 1,
    /// Request expecting a [`Method::Response`].
    Request = 2,
    /// Reply to a request, matched by id.
    Response = 3,
    /// Long-running exchange with a 32-bit body length.
    Streaming = 4,
    /// Heartbeat probe.
    AliveRequest = 5,
    /// Heartbeat acknowledgement.
    AliveResponse = 6,
    /// Ask the peer to adopt a new frame capacity.
    BufferSizeRequest = 7,
    /// Confirm the adopted frame capacity.
    BufferSizeResponse = 8,
}

impl Method {
    /// Numeric code written into the second control byte.
    #[must_use]
    pub const fn code(self) -> u8 { self as u8 }

    /// Map a wire code back to a method.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Signal),
            2 => Some(Self::Request),
            3 => Some(Self::Response),
            4 => Some(Self::Streaming),
            5 => Some(Self::AliveRequest),
            6 => Some(Self::AliveResponse),
            7 => Some(Self::BufferSizeRequest),
            8 => Some(Self::BufferSizeResponse),
            _ => None,
        }
    }

    /// Whether frames of this method carry a correlation id.
    #[must_use]
    pub const fn carries_id(self) -> bool {
        matches!(
            self,
            Self::Request
                | Self::Response
                | Self::Streaming
                | Self::AliveRequest
                | Self::AliveResponse
        )
    }

    /// Whether a sender of this method may wait for a reply.
    #[must_use]
    pub const fn expects_reply(self) -> bool {
        matches!(self, Self::Request | Self::Streaming | Self::AliveRequest)
    }

    /// Whether this method answers a previously sent message.
    #[must_use]
    pub const fn is_response(self) -> bool {
        matches!(self, Self::Response | Self::AliveResponse)
    }

    /// Whether an inbound frame of this method may settle a pending entry.
    ///
    /// Peer-initiated requests share the id space with our own requests, so
    /// they never resolve anything.
    #[must_use]
    pub const fn resolves_pending(self) -> bool {
        matches!(self, Self::Response | Self::AliveResponse | Self::Streaming)
    }

    /// Width in bytes of the body-length field for this method.
    #[must_use]
    pub const fn length_width(self) -> usize {
        match self {
            Self::Signal | Self::BufferSizeRequest | Self::BufferSizeResponse => 1,
            Self::Streaming => 4,
            _ => 2,
        }
    }

    /// Largest body the length field can describe.
    #[must_use]
    pub const fn max_body_len(self) -> usize {
        match self.length_width() {
            1 => u8::MAX as usize,
            2 => u16::MAX as usize,
            _ => u32::MAX as usize,
        }
    }
}

impl TryFrom<u8> for Method {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> { Self::from_code(code).ok_or(code) }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Signal => "SIGNAL",
            Self::Request => "REQUEST",
            Self::Response => "RESPONSE",
            Self::Streaming => "STREAMING",
            Self::AliveRequest => "ALIVE_REQUEST",
            Self::AliveResponse => "ALIVE_RESPONSE",
            Self::BufferSizeRequest => "BUFFER_SIZE_REQUEST",
            Self::BufferSizeResponse => "BUFFER_SIZE_RESPONSE",
        };
        f.write_str(name)
    }
}

/// A logical protocol message, possibly delivered across several frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    version: u8,
    method: Method,
    id: u16,
    path: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    total_body_length: usize,
    parts: usize,
}

impl Message {
    /// Create an empty message of the given method.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            version: DEFAULT_VERSION,
            method,
            id: 0,
            path: None,
            headers: Vec::new(),
            body: None,
            total_body_length: 0,
            parts: 1,
        }
    }

    /// A `SIGNAL` addressed to `path`.
    #[must_use]
    pub fn signal(path: impl Into<String>) -> Self { Self::new(Method::Signal).with_path(path) }

    /// A `REQUEST` addressed to `path`. The id is assigned on send.
    #[must_use]
    pub fn request(path: impl Into<String>) -> Self { Self::new(Method::Request).with_path(path) }

    /// A `STREAMING` message addressed to `path`.
    #[must_use]
    pub fn streaming(path: impl Into<String>) -> Self {
        Self::new(Method::Streaming).with_path(path)
    }

    /// A `RESPONSE` answering `request`, carrying its id.
    #[must_use]
    pub fn response_to(request: &Message) -> Self {
        Self::new(Method::Response).with_id(request.id)
    }

    /// Set the protocol version.
    #[must_use]
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Set the correlation id. Zero means "assign one on send".
    #[must_use]
    pub fn with_id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    /// Set the routing path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Append a header. Order is preserved on the wire.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Attach a complete body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.total_body_length = body.len();
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn version(&self) -> u8 { self.version }

    #[must_use]
    pub fn method(&self) -> Method { self.method }

    #[must_use]
    pub fn id(&self) -> u16 { self.id }

    #[must_use]
    pub fn path(&self) -> Option<&str> { self.path.as_deref() }

    /// All headers in wire order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// Fetch the first header value stored under `key`.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Body bytes carried so far, if the message has a body at all.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> { self.body.as_ref() }

    /// Bytes of body present in this instance.
    #[must_use]
    pub fn body_length(&self) -> usize { self.body.as_ref().map_or(0, Bytes::len) }

    /// Body length declared on the wire for the whole logical message.
    #[must_use]
    pub fn total_body_length(&self) -> usize { self.total_body_length }

    /// Number of physical frames the message occupied.
    #[must_use]
    pub fn parts(&self) -> usize { self.parts }

    /// Whether every declared body byte is present.
    #[must_use]
    pub fn is_complete(&self) -> bool { self.body_length() == self.total_body_length }

    pub(crate) fn set_id(&mut self, id: u16) { self.id = id; }

    pub(crate) fn set_parts(&mut self, parts: usize) { self.parts = parts.max(1); }

    pub(crate) fn set_headers(&mut self, headers: Vec<(String, String)>) {
        self.headers = headers;
    }

    pub(crate) fn set_path(&mut self, path: Option<String>) { self.path = path; }

    /// Attach the first fragment of a body whose full length is `total`.
    pub(crate) fn set_fragment(&mut self, fragment: Bytes, total: usize) {
        debug_assert!(fragment.len() <= total, "fragment longer than declared body");
        self.body = Some(fragment);
        self.total_body_length = total;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Method::Signal, 1, false)]
    #[case(Method::Request, 2, true)]
    #[case(Method::Response, 2, true)]
    #[case(Method::Streaming, 4, true)]
    #[case(Method::AliveRequest, 2, true)]
    #[case(Method::AliveResponse, 2, true)]
    #[case(Method::BufferSizeRequest, 1, false)]
    #[case(Method::BufferSizeResponse, 1, false)]
    fn method_wire_properties(#[case] method: Method, #[case] width: usize, #[case] id: bool) {
        assert_eq!(method.length_width(), width);
        assert_eq!(method.carries_id(), id);
        assert_eq!(Method::from_code(method.code()), Some(method));
    }

    #[test]
    fn unknown_method_code_is_rejected() {
        assert_eq!(Method::try_from(0), Err(0));
        assert_eq!(Method::try_from(9), Err(9));
    }

    #[test]
    fn header_lookup_returns_first_match() {
        let message = Message::signal("/led")
            .with_header("colour", "red")
            .with_header("colour", "blue");
        assert_eq!(message.header("colour"), Some("red"));
        assert_eq!(message.header("missing"), None);
    }

    #[test]
    fn fragment_tracks_declared_total() {
        let mut message = Message::request("/upload");
        message.set_fragment(Bytes::from_static(b"abc"), 10);
        assert_eq!(message.body_length(), 3);
        assert_eq!(message.total_body_length(), 10);
        assert!(!message.is_complete());
    }

    #[test]
    fn response_copies_request_id() {
        let request = Message::request("/ping").with_id(77);
        let response = Message::response_to(&request);
        assert_eq!(response.method(), Method::Response);
        assert_eq!(response.id(), 77);
    }
}
