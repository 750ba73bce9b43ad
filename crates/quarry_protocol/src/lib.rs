//! # Quarry Protocol Pipeline
//!
//! Per-connection byte-stream framing and typed packet (de)serialization for
//! the Quarry game server wire protocol.
//!
//! ## Wire format
//!
//! Every frame on the wire is `[length: VarInt][packet id: VarInt][payload]`.
//! Once compression has been negotiated, the framed body becomes
//! `[data_length: VarInt][zlib-compressed id + payload]`, where a
//! `data_length` of zero marks a body that was left uncompressed because it
//! fell below the negotiated threshold.
//!
//! When a deployment configures a pre-shared key, the whole stream is
//! additionally run through an AES-128-CFB8 cipher. Ordering is fixed:
//! compress first, then encrypt. The cipher is always the outermost layer
//! on the wire, and decode reverses the two.
//!
//! ## Decode guarantees
//!
//! * Partial frames arriving across arbitrarily many reads are buffered and
//!   reassembled; the decoded packet sequence is identical no matter how the
//!   stream is split.
//! * A packet id that is not valid for the connection's current state, or a
//!   payload that does not fully consume its frame, is a protocol violation
//!   reported as an error, never a partially decoded packet.
//! * `encode` and `decode` round-trip bit-for-bit for every packet type.

pub mod buffer;
pub mod crypto;
pub mod framing;
pub mod packet;
pub mod state;
pub mod varint;

pub use buffer::{PacketReader, PacketWriter};
pub use crypto::{cipher_pair, Aes128Cfb8Dec, Aes128Cfb8Enc, KEY_LEN};
pub use framing::{FrameDecoder, FrameEncoder, MAX_FRAME_LEN};
pub use packet::{ClientboundPacket, ServerboundPacket, PROTOCOL_VERSION};
pub use state::ConnectionState;

use thiserror::Error;

/// Errors raised anywhere in the protocol pipeline.
///
/// Every variant is a protocol violation from the connection's point of
/// view: the caller is expected to close the connection with the error's
/// rendering as the diagnostic reason.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("varint exceeds {} bytes", varint::MAX_VARINT_LEN)]
    VarIntTooLong,

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("frame declares a negative length")]
    NegativeFrameLength,

    #[error("unexpected end of payload while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("string field is not valid utf-8")]
    InvalidString,

    #[error("string of {len} bytes exceeds the {max} byte limit")]
    StringTooLong { len: usize, max: usize },

    #[error("packet id {id:#04x} is not valid in the {state:?} state")]
    UnknownPacketId { id: i32, state: ConnectionState },

    #[error("{remaining} trailing bytes after decoding packet id {id:#04x}")]
    TrailingBytes { id: i32, remaining: usize },

    #[error("compressed body declared {declared} bytes but inflated to {actual}")]
    CompressionMismatch { declared: usize, actual: usize },

    #[error("compressed body declares {declared} bytes, over the {max} byte limit")]
    DecompressionTooLarge { declared: usize, max: usize },

    #[error("zlib error: {0}")]
    Zlib(#[from] std::io::Error),

    #[error("cipher key must be {expected} bytes, got {0}", expected = crypto::KEY_LEN)]
    BadKeyLength(usize),
}
