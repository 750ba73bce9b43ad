//! Length-delimited frame assembly and disassembly.
//!
//! The decoder accumulates raw socket bytes and yields complete frame
//! bodies; a frame split across any number of reads is reassembled without
//! loss or misalignment. The encoder produces the mirror-image bytes.
//! Compression (zlib, past a negotiated threshold) and the stream cipher
//! are layered here so packet codecs only ever see plain bodies.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::crypto::{decrypt_in_place, encrypt_in_place, Aes128Cfb8Dec, Aes128Cfb8Enc};
use crate::varint::{read_varint, varint_len, write_varint};
use crate::ProtocolError;

/// Upper bound on a single frame body, compressed or not.
pub const MAX_FRAME_LEN: usize = 2 * 1024 * 1024;

/// Reassembles frames from an incoming byte stream.
pub struct FrameDecoder {
    buffer: Vec<u8>,
    compression: Option<i32>,
    cipher: Option<Aes128Cfb8Dec>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            compression: None,
            cipher: None,
        }
    }

    /// Enables threshold compression for all subsequent frames.
    pub fn enable_compression(&mut self, threshold: i32) {
        self.compression = Some(threshold);
    }

    /// Enables stream decryption for all subsequent bytes.
    pub fn enable_encryption(&mut self, cipher: Aes128Cfb8Dec) {
        self.cipher = Some(cipher);
    }

    /// Feeds raw bytes read from the socket.
    pub fn feed(&mut self, data: &[u8]) {
        match self.cipher.as_mut() {
            Some(cipher) => {
                let start = self.buffer.len();
                self.buffer.extend_from_slice(data);
                decrypt_in_place(cipher, &mut self.buffer[start..]);
            }
            None => self.buffer.extend_from_slice(data),
        }
    }

    /// Pops the next complete frame body, decompressed if necessary.
    ///
    /// Returns `Ok(None)` when the buffered bytes do not yet hold a whole
    /// frame; the partial frame stays buffered for the next `feed`.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let (len, header) = match read_varint(&self.buffer)? {
            Some(v) => v,
            None => return Ok(None),
        };
        if len < 0 {
            return Err(ProtocolError::NegativeFrameLength);
        }
        let len = len as usize;
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        if self.buffer.len() < header + len {
            return Ok(None);
        }

        let body: Vec<u8> = self.buffer[header..header + len].to_vec();
        self.buffer.drain(..header + len);

        match self.compression {
            None => Ok(Some(body)),
            Some(_) => Ok(Some(decompress_body(&body)?)),
        }
    }
}

/// Splits the `[data_length][payload]` compressed body format back into a
/// plain body.
fn decompress_body(body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let (declared, consumed) = match read_varint(body)? {
        Some(v) => v,
        None => return Err(ProtocolError::UnexpectedEof("compressed data length")),
    };
    let rest = &body[consumed..];
    if declared == 0 {
        // Below-threshold body shipped uncompressed.
        return Ok(rest.to_vec());
    }
    let declared = declared as usize;
    if declared > MAX_FRAME_LEN {
        return Err(ProtocolError::DecompressionTooLarge {
            declared,
            max: MAX_FRAME_LEN,
        });
    }
    let mut out = Vec::with_capacity(declared);
    ZlibDecoder::new(rest).read_to_end(&mut out)?;
    if out.len() != declared {
        return Err(ProtocolError::CompressionMismatch {
            declared,
            actual: out.len(),
        });
    }
    Ok(out)
}

/// Produces wire bytes for outgoing frame bodies.
pub struct FrameEncoder {
    compression: Option<i32>,
    cipher: Option<Aes128Cfb8Enc>,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self {
            compression: None,
            cipher: None,
        }
    }

    /// Enables threshold compression for all subsequent frames.
    pub fn enable_compression(&mut self, threshold: i32) {
        self.compression = Some(threshold);
    }

    /// Enables stream encryption for all subsequent bytes.
    pub fn enable_encryption(&mut self, cipher: Aes128Cfb8Enc) {
        self.cipher = Some(cipher);
    }

    /// Frames `body` (packet id + payload) into wire bytes.
    pub fn encode(&mut self, body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let mut wire = match self.compression {
            None => {
                let mut out = Vec::with_capacity(varint_len(body.len() as i32) + body.len());
                write_varint(&mut out, body.len() as i32);
                out.extend_from_slice(body);
                out
            }
            Some(threshold) => {
                let inner = if threshold >= 0 && body.len() >= threshold as usize {
                    let mut inner = Vec::new();
                    write_varint(&mut inner, body.len() as i32);
                    let mut z = ZlibEncoder::new(inner, Compression::default());
                    z.write_all(body)?;
                    z.finish()?
                } else {
                    let mut inner = Vec::with_capacity(1 + body.len());
                    write_varint(&mut inner, 0);
                    inner.extend_from_slice(body);
                    inner
                };
                let mut out = Vec::with_capacity(varint_len(inner.len() as i32) + inner.len());
                write_varint(&mut out, inner.len() as i32);
                out.extend_from_slice(&inner);
                out
            }
        };

        if let Some(cipher) = self.cipher.as_mut() {
            encrypt_in_place(cipher, &mut wire);
        }
        Ok(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cipher_pair;

    fn decode_all(decoder: &mut FrameDecoder) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Some(frame) = decoder.next_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn split_stream_decodes_identically() {
        let bodies: Vec<Vec<u8>> = vec![
            vec![0x01],
            (0u8..200).collect(),
            vec![0x07, 0xFF, 0x00],
        ];
        let mut encoder = FrameEncoder::new();
        let wire: Vec<u8> = bodies
            .iter()
            .flat_map(|b| encoder.encode(b).unwrap())
            .collect();

        // Whole-stream decode as the reference.
        let mut reference = FrameDecoder::new();
        reference.feed(&wire);
        let expected = decode_all(&mut reference);
        assert_eq!(expected, bodies);

        // Byte-at-a-time decode must reconstruct the same sequence.
        let mut trickle = FrameDecoder::new();
        let mut got = Vec::new();
        for &byte in &wire {
            trickle.feed(std::slice::from_ref(&byte));
            got.extend(decode_all(&mut trickle));
        }
        assert_eq!(got, expected);

        // And an uneven three-way split.
        let mut chunked = FrameDecoder::new();
        let mut got = Vec::new();
        for chunk in [&wire[..3], &wire[3..10], &wire[10..]] {
            chunked.feed(chunk);
            got.extend(decode_all(&mut chunked));
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn compression_threshold_roundtrip() {
        let mut encoder = FrameEncoder::new();
        encoder.enable_compression(64);
        let mut decoder = FrameDecoder::new();
        decoder.enable_compression(64);

        let small = vec![0x05u8; 10];
        let large = vec![0xABu8; 4096];

        let small_wire = encoder.encode(&small).unwrap();
        let large_wire = encoder.encode(&large).unwrap();
        // The large body must actually have shrunk on the wire.
        assert!(large_wire.len() < large.len());

        decoder.feed(&small_wire);
        decoder.feed(&large_wire);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), small);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), large);
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn encrypted_stream_roundtrip() {
        let key = [9u8; 16];
        let (enc, _) = cipher_pair(&key).unwrap();
        let (_, dec) = cipher_pair(&key).unwrap();

        let mut encoder = FrameEncoder::new();
        encoder.enable_encryption(enc);
        encoder.enable_compression(32);
        let mut decoder = FrameDecoder::new();
        decoder.enable_encryption(dec);
        decoder.enable_compression(32);

        let bodies = vec![vec![0x00u8; 100], vec![0x01, 0x02, 0x03]];
        for body in &bodies {
            let wire = encoder.encode(body).unwrap();
            // Split mid-frame to exercise cipher state continuity.
            let mid = wire.len() / 2;
            decoder.feed(&wire[..mid]);
            assert!(decoder.next_frame().unwrap().is_none());
            decoder.feed(&wire[mid..]);
            assert_eq!(decoder.next_frame().unwrap().as_ref(), Some(body));
        }
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut decoder = FrameDecoder::new();
        let mut wire = Vec::new();
        write_varint(&mut wire, (MAX_FRAME_LEN + 1) as i32);
        decoder.feed(&wire);
        assert!(matches!(
            decoder.next_frame(),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn lying_compression_header_is_rejected() {
        let mut encoder = FrameEncoder::new();
        encoder.enable_compression(0);
        let wire = encoder.encode(&[0x11u8; 50]).unwrap();

        // Corrupt the declared inflated size (second varint in the frame).
        let mut corrupted = wire.clone();
        corrupted[1] = corrupted[1].wrapping_add(1);
        let mut decoder = FrameDecoder::new();
        decoder.enable_compression(0);
        decoder.feed(&corrupted);
        assert!(decoder.next_frame().is_err());
    }
}
