//! Variable-length integer codec.
//!
//! The wire protocol encodes lengths and packet ids as VarInts: 7 bits of
//! payload per byte, least-significant group first, with the high bit set on
//! every byte except the last. A 32-bit value never needs more than five
//! bytes.

use crate::ProtocolError;

/// Maximum encoded length of a 32-bit varint.
pub const MAX_VARINT_LEN: usize = 5;

/// Appends `value` to `buf` in varint encoding.
pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut remaining = value as u32;
    loop {
        let byte = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Encoded length of `value`, in bytes.
pub fn varint_len(value: i32) -> usize {
    let mut remaining = value as u32;
    let mut len = 1;
    while remaining >= 0x80 {
        remaining >>= 7;
        len += 1;
    }
    len
}

/// Reads a varint from the front of `data`.
///
/// Returns `Ok(None)` if `data` ends before the varint is complete (the
/// caller should buffer more bytes), and `Ok(Some((value, consumed)))` once
/// a full varint is available.
pub fn read_varint(data: &[u8]) -> Result<Option<(i32, usize)>, ProtocolError> {
    let mut result: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        result |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((result as i32, i + 1)));
        }
        if i + 1 == MAX_VARINT_LEN {
            return Err(ProtocolError::VarIntTooLong);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: i32) {
        let mut buf = Vec::new();
        write_varint(&mut buf, value);
        assert_eq!(buf.len(), varint_len(value));
        let (decoded, consumed) = read_varint(&buf).unwrap().unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn roundtrips_boundary_values() {
        for value in [0, 1, 127, 128, 255, 16383, 16384, i32::MAX, -1, i32::MIN] {
            roundtrip(value);
        }
    }

    #[test]
    fn known_encodings() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 300);
        assert_eq!(buf, [0xAC, 0x02]);

        buf.clear();
        write_varint(&mut buf, -1);
        assert_eq!(buf, [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn incomplete_input_asks_for_more() {
        assert!(read_varint(&[0x80]).unwrap().is_none());
        assert!(read_varint(&[0xFF, 0xFF]).unwrap().is_none());
        assert!(read_varint(&[]).unwrap().is_none());
    }

    #[test]
    fn overlong_input_is_rejected() {
        let err = read_varint(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert!(matches!(err, Err(ProtocolError::VarIntTooLong)));
    }
}
