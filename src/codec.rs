//! Binary frame codec.
//!
//! A frame is laid out as:
//!
//! ```text
//! control1   version << 2 | has_id << 1 | has_path
//! control2   method  << 2 | has_headers << 1 | has_body
//! [id]       u16, big-endian                       (has_id)
//! [path ETX]                                       (has_path)
//! [count (key RS value ETX){count}]                (has_headers)
//! [length body...]                                 (has_body)
//! ```
//!
//! The length field is 1, 2 or 4 bytes wide depending on the method and
//! always declares the *total* body length. A frame may carry fewer body
//! bytes than declared; the remainder arrives as headerless continuation
//! bytes handled by the [`Reassembler`](crate::fragment::Reassembler).
//!
//! Both directions are pure functions over byte slices. Decoding returns
//! `Ok(None)` when the header is not yet complete so the caller can buffer
//! and retry once more bytes arrive.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    byte_order::{read_length_field, read_network_u16, write_network_u16, write_network_u32},
    message::{MAX_HEADERS, MAX_VERSION, Message, Method},
};

pub mod error;

pub use error::{EncodeError, FramingError};

/// Terminator closing the path and each header value (ETX).
pub const ETX: u8 = 0x03;

/// Separator between a header key and its value (RS).
pub const RS: u8 = 0x1E;

const HAS_PATH: u8 = 0b01;
const HAS_ID: u8 = 0b10;
const HAS_BODY: u8 = 0b01;
const HAS_HEADERS: u8 = 0b10;

/// A frame decoded from the front of a byte buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedFrame {
    /// The message, holding whatever body bytes this frame carried.
    pub message: Message,
    /// Length of everything before the body.
    pub header_len: usize,
    /// Bytes consumed from the input, header and body fragment included.
    pub consumed: usize,
}

impl DecodedFrame {
    /// Size of the whole logical frame once every body byte has arrived.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.header_len + self.message.total_body_length()
    }
}

/// Compute the encoded size of everything before the body.
///
/// # Errors
///
/// Returns an [`EncodeError`] if the message cannot be encoded.
pub fn encoded_head_len(message: &Message) -> Result<usize, EncodeError> {
    validate(message)?;
    Ok(head_len(message))
}

/// Write control bytes, id, path, headers and the body-length field.
///
/// # Errors
///
/// Returns an [`EncodeError`] if the message violates a wire constraint.
/// Nothing is written to `dst` in that case.
pub fn encode_head(message: &Message, dst: &mut BytesMut) -> Result<(), EncodeError> {
    validate(message)?;
    dst.reserve(head_len(message));

    let method = message.method();
    let has_id = method.carries_id();
    let has_headers = !message.headers().is_empty();

    let mut control1 = message.version() << 2;
    if message.path().is_some() {
        control1 |= HAS_PATH;
    }
    if has_id {
        control1 |= HAS_ID;
    }
    let mut control2 = method.code() << 2;
    if message.body().is_some() {
        control2 |= HAS_BODY;
    }
    if has_headers {
        control2 |= HAS_HEADERS;
    }
    dst.put_u8(control1);
    dst.put_u8(control2);

    if has_id {
        dst.put_slice(&write_network_u16(message.id()));
    }
    if let Some(path) = message.path() {
        dst.put_slice(path.as_bytes());
        dst.put_u8(ETX);
    }
    if has_headers {
        let count = u8::try_from(message.headers().len()).map_err(|_| {
            EncodeError::TooManyHeaders {
                count: message.headers().len(),
                max: MAX_HEADERS,
            }
        })?;
        dst.put_u8(count);
        for (key, value) in message.headers() {
            dst.put_slice(key.as_bytes());
            dst.put_u8(RS);
            dst.put_slice(value.as_bytes());
            dst.put_u8(ETX);
        }
    }
    if let Some(body) = message.body() {
        put_length(method, body.len(), dst)?;
    }
    Ok(())
}

/// Encode a complete message into a single contiguous buffer.
///
/// This ignores frame capacity; use [`Fragmenter`](crate::fragment::Fragmenter)
/// to obtain the physical writes for a connection.
///
/// # Errors
///
/// Returns an [`EncodeError`] if the message violates a wire constraint.
///
/// # Examples
///
/// ```
/// use iotwire::{codec, message::Message};
///
/// let bytes = codec::encode(&Message::signal("/led").with_body(vec![0x01])).unwrap();
/// assert_eq!(&bytes[2..], b"/led\x03\x01\x01");
/// ```
pub fn encode(message: &Message) -> Result<BytesMut, EncodeError> {
    let mut dst = BytesMut::new();
    encode_head(message, &mut dst)?;
    if let Some(body) = message.body() {
        dst.extend_from_slice(body);
    }
    Ok(dst)
}

/// Decode one frame from the front of `src`.
///
/// Returns `Ok(None)` if `src` ends before the header is complete. Body bytes
/// beyond what `src` holds are not waited for: the returned message carries
/// the fragment that was present and declares the full length.
///
/// # Errors
///
/// Returns a [`FramingError`] if the bytes cannot form a valid frame.
pub fn decode(src: &[u8]) -> Result<Option<DecodedFrame>, FramingError> {
    match FrameReader::new(src).read_frame() {
        Ok(frame) => Ok(Some(frame)),
        Err(Interrupt::Incomplete) => Ok(None),
        Err(Interrupt::Malformed(err)) => Err(err),
    }
}

fn validate(message: &Message) -> Result<(), EncodeError> {
    let method = message.method();
    if message.version() > MAX_VERSION {
        return Err(EncodeError::InvalidVersion {
            version: message.version(),
            max: MAX_VERSION,
        });
    }
    if method.carries_id() && message.id() == 0 {
        return Err(EncodeError::MissingId { method });
    }
    if message.headers().len() > MAX_HEADERS {
        return Err(EncodeError::TooManyHeaders {
            count: message.headers().len(),
            max: MAX_HEADERS,
        });
    }
    if message.path().is_some_and(|path| path.as_bytes().contains(&ETX)) {
        return Err(EncodeError::InvalidPath);
    }
    for (key, value) in message.headers() {
        if key.bytes().any(|b| b == ETX || b == RS) || value.as_bytes().contains(&ETX) {
            return Err(EncodeError::InvalidHeader { key: key.clone() });
        }
    }
    let size = message.body_length();
    if size > method.max_body_len() {
        return Err(EncodeError::BodyTooLarge {
            method,
            size,
            max: method.max_body_len(),
        });
    }
    Ok(())
}

fn head_len(message: &Message) -> usize {
    let mut len = 2;
    if message.method().carries_id() {
        len += 2;
    }
    if let Some(path) = message.path() {
        len += path.len() + 1;
    }
    if !message.headers().is_empty() {
        len += 1 + message
            .headers()
            .iter()
            .map(|(key, value)| key.len() + value.len() + 2)
            .sum::<usize>();
    }
    if message.body().is_some() {
        len += message.method().length_width();
    }
    len
}

fn put_length(method: Method, len: usize, dst: &mut BytesMut) -> Result<(), EncodeError> {
    let too_large = || EncodeError::BodyTooLarge {
        method,
        size: len,
        max: method.max_body_len(),
    };
    match method.length_width() {
        1 => dst.put_u8(u8::try_from(len).map_err(|_| too_large())?),
        2 => dst.put_slice(&write_network_u16(
            u16::try_from(len).map_err(|_| too_large())?,
        )),
        _ => dst.put_slice(&write_network_u32(
            u32::try_from(len).map_err(|_| too_large())?,
        )),
    }
    Ok(())
}

enum Interrupt {
    Incomplete,
    Malformed(FramingError),
}

impl From<FramingError> for Interrupt {
    fn from(err: FramingError) -> Self { Self::Malformed(err) }
}

struct FrameReader<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(src: &'a [u8]) -> Self { Self { src, pos: 0 } }

    fn byte(&mut self) -> Result<u8, Interrupt> {
        let byte = *self.src.get(self.pos).ok_or(Interrupt::Incomplete)?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Interrupt> {
        let end = self.pos.checked_add(len).ok_or(Interrupt::Incomplete)?;
        let slice = self.src.get(self.pos..end).ok_or(Interrupt::Incomplete)?;
        self.pos = end;
        Ok(slice)
    }

    /// Bytes up to (not including) `stop`, consuming the delimiter.
    fn until(&mut self, stop: u8) -> Result<&'a [u8], Interrupt> {
        let rest = self.src.get(self.pos..).unwrap_or_default();
        let offset = rest
            .iter()
            .position(|b| *b == stop)
            .ok_or(Interrupt::Incomplete)?;
        let field = self.take(offset)?;
        self.pos += 1;
        Ok(field)
    }

    /// A header key: bytes up to RS. Hitting ETX first is malformed.
    fn key(&mut self, index: usize) -> Result<&'a [u8], Interrupt> {
        let rest = self.src.get(self.pos..).unwrap_or_default();
        match rest.iter().position(|b| *b == RS || *b == ETX) {
            None => Err(Interrupt::Incomplete),
            Some(offset) if rest.get(offset) == Some(&ETX) => {
                Err(FramingError::MissingSeparator { index }.into())
            }
            Some(offset) => {
                let key = self.take(offset)?;
                self.pos += 1;
                Ok(key)
            }
        }
    }

    fn text(bytes: &[u8], field: &'static str) -> Result<String, Interrupt> {
        String::from_utf8(bytes.to_vec()).map_err(|_| FramingError::InvalidUtf8 { field }.into())
    }

    fn read_frame(mut self) -> Result<DecodedFrame, Interrupt> {
        let control1 = self.byte()?;
        let control2 = self.byte()?;
        let code = control2 >> 2;
        let method = Method::from_code(code).ok_or(FramingError::UnknownMethod { code })?;
        let mut message = Message::new(method).with_version(control1 >> 2);

        if control1 & HAS_ID != 0 {
            let raw = <[u8; 2]>::try_from(self.take(2)?).map_err(|_| Interrupt::Incomplete)?;
            let id = read_network_u16(raw);
            if id == 0 {
                return Err(FramingError::ZeroId.into());
            }
            message.set_id(id);
        } else if method.carries_id() {
            return Err(FramingError::MissingId { method }.into());
        }

        if control1 & HAS_PATH != 0 {
            let path = self.until(ETX)?;
            message.set_path(Some(Self::text(path, "path")?));
        }

        if control2 & HAS_HEADERS != 0 {
            let count = usize::from(self.byte()?);
            let mut headers = Vec::with_capacity(count);
            for index in 0..count {
                let key = Self::text(self.key(index)?, "header key")?;
                let value = Self::text(self.until(ETX)?, "header value")?;
                headers.push((key, value));
            }
            message.set_headers(headers);
        }

        if control2 & HAS_BODY == 0 {
            return Ok(DecodedFrame {
                message,
                header_len: self.pos,
                consumed: self.pos,
            });
        }

        let width = method.length_width();
        let field = self.take(width)?;
        let total = read_length_field(field, width).ok_or(Interrupt::Incomplete)?;
        let header_len = self.pos;
        let available = self.src.len().saturating_sub(header_len);
        let fragment = self.take(available.min(total))?;
        message.set_fragment(Bytes::copy_from_slice(fragment), total);

        Ok(DecodedFrame {
            message,
            header_len,
            consumed: self.pos,
        })
    }
}
