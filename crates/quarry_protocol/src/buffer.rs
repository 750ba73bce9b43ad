//! Bounds-checked primitive codecs over packet payloads.
//!
//! `PacketReader` walks a decoded frame body; every read is length-checked
//! and a short buffer surfaces as [`ProtocolError::UnexpectedEof`] rather
//! than a panic. `PacketWriter` is the mirror image for encoding. Multibyte
//! integers are big-endian on the wire.

use crate::varint::{read_varint, write_varint};
use crate::ProtocolError;
use uuid::Uuid;

/// Maximum byte length accepted for any string field unless a tighter limit
/// is passed explicitly.
pub const MAX_STRING_LEN: usize = 32_767;

/// Sequential reader over a packet body.
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::UnexpectedEof(what));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_varint(&mut self) -> Result<i32, ProtocolError> {
        match read_varint(&self.data[self.pos..])? {
            Some((value, consumed)) => {
                self.pos += consumed;
                Ok(value)
            }
            None => Err(ProtocolError::UnexpectedEof("varint")),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1, "u8")?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.take(2, "u16")?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.take(4, "i32")?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        let b = self.take(8, "i64")?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_bits(self.read_i64()? as u64))
    }

    /// Reads a varint-prefixed utf-8 string of at most `max` bytes.
    pub fn read_string(&mut self, max: usize) -> Result<String, ProtocolError> {
        let len = self.read_varint()?;
        if len < 0 {
            return Err(ProtocolError::UnexpectedEof("string length"));
        }
        let len = len as usize;
        if len > max {
            return Err(ProtocolError::StringTooLong { len, max });
        }
        let bytes = self.take(len, "string body")?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidString)
    }

    pub fn read_uuid(&mut self) -> Result<Uuid, ProtocolError> {
        let b = self.take(16, "uuid")?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(b);
        Ok(Uuid::from_bytes(bytes))
    }
}

/// Sequential writer producing a packet body.
#[derive(Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_varint(&mut self, value: i32) {
        write_varint(&mut self.buf, value);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_i64(value.to_bits() as i64);
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_varint(value.len() as i32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn write_uuid(&mut self, value: Uuid) {
        self.buf.extend_from_slice(value.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_roundtrip() {
        let mut w = PacketWriter::new();
        w.write_varint(300);
        w.write_bool(true);
        w.write_u16(0xBEEF);
        w.write_i32(-7);
        w.write_i64(1 << 40);
        w.write_f64(64.5);
        w.write_string("alice");
        let id = Uuid::new_v4();
        w.write_uuid(id);

        let body = w.into_inner();
        let mut r = PacketReader::new(&body);
        assert_eq!(r.read_varint().unwrap(), 300);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_u16().unwrap(), 0xBEEF);
        assert_eq!(r.read_i32().unwrap(), -7);
        assert_eq!(r.read_i64().unwrap(), 1 << 40);
        assert_eq!(r.read_f64().unwrap(), 64.5);
        assert_eq!(r.read_string(16).unwrap(), "alice");
        assert_eq!(r.read_uuid().unwrap(), id);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn short_buffer_is_eof_not_panic() {
        let mut r = PacketReader::new(&[0x00, 0x01]);
        assert_eq!(r.read_u8().unwrap(), 0);
        assert!(matches!(
            r.read_i64(),
            Err(ProtocolError::UnexpectedEof("i64"))
        ));
    }

    #[test]
    fn oversized_string_is_rejected() {
        let mut w = PacketWriter::new();
        w.write_string("this is longer than eight bytes");
        let body = w.into_inner();
        let mut r = PacketReader::new(&body);
        assert!(matches!(
            r.read_string(8),
            Err(ProtocolError::StringTooLong { .. })
        ));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut buf = Vec::new();
        crate::varint::write_varint(&mut buf, 2);
        buf.extend_from_slice(&[0xC0, 0xAF]);
        let mut r = PacketReader::new(&buf);
        assert!(matches!(
            r.read_string(16),
            Err(ProtocolError::InvalidString)
        ));
    }
}
