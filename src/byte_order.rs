//! Helpers for explicit network byte-order conversions.
//!
//! Every multi-byte field on the wire (correlation ids, body lengths and the
//! buffer-size payload) is big-endian. Keeping the conversions here scopes the
//! Clippy expectation to one place.

/// Serialise a `u16` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use iotwire::byte_order::write_network_u16;
///
/// assert_eq!(write_network_u16(0x1234), [0x12, 0x34]);
/// ```
#[must_use]
pub fn write_network_u16(value: u16) -> [u8; 2] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    value.to_be_bytes()
}

/// Parse a network-order `u16` from its on-wire representation.
#[must_use]
pub fn read_network_u16(bytes: [u8; 2]) -> u16 {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    u16::from_be_bytes(bytes)
}

/// Serialise a `u32` in network byte order (big-endian).
///
/// # Examples
///
/// ```
/// use iotwire::byte_order::write_network_u32;
///
/// assert_eq!(write_network_u32(2048), [0x00, 0x00, 0x08, 0x00]);
/// ```
#[must_use]
pub fn write_network_u32(value: u32) -> [u8; 4] {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    value.to_be_bytes()
}

/// Parse a network-order `u32` from its on-wire representation.
#[must_use]
pub fn read_network_u32(bytes: [u8; 4]) -> u32 {
    #[expect(
        clippy::big_endian_bytes,
        reason = "Network byte order requires big-endian bytes."
    )]
    u32::from_be_bytes(bytes)
}

/// Read a big-endian length field of `width` bytes (1, 2 or 4).
///
/// Returns `None` when `bytes` is shorter than `width` or the width is not
/// one the wire format uses.
#[must_use]
pub fn read_length_field(bytes: &[u8], width: usize) -> Option<usize> {
    let field = bytes.get(..width)?;
    match width {
        1 => field.first().map(|b| usize::from(*b)),
        2 => <[u8; 2]>::try_from(field)
            .ok()
            .map(|raw| usize::from(read_network_u16(raw))),
        4 => <[u8; 4]>::try_from(field)
            .ok()
            .and_then(|raw| usize::try_from(read_network_u32(raw)).ok()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn u16_round_trips_in_network_order() {
        assert_eq!(write_network_u16(0xBEEF), [0xBE, 0xEF]);
        assert_eq!(read_network_u16([0xBE, 0xEF]), 0xBEEF);
    }

    #[test]
    fn u32_round_trips_in_network_order() {
        assert_eq!(write_network_u32(0x0102_0304), [1, 2, 3, 4]);
        assert_eq!(read_network_u32([1, 2, 3, 4]), 0x0102_0304);
    }

    #[rstest]
    #[case::one_byte(&[0x2A, 0xFF], 1, Some(42))]
    #[case::two_bytes(&[0x01, 0x00], 2, Some(256))]
    #[case::four_bytes(&[0x00, 0x01, 0x00, 0x00], 4, Some(65_536))]
    #[case::short_input(&[0x01], 2, None)]
    #[case::unsupported_width(&[0, 0, 0], 3, None)]
    fn length_field_widths(
        #[case] bytes: &[u8],
        #[case] width: usize,
        #[case] expected: Option<usize>,
    ) {
        assert_eq!(read_length_field(bytes, width), expected);
    }
}
