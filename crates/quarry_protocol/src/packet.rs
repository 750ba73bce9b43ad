//! Typed packet schemas keyed by (direction, connection state, id).
//!
//! Each packet has a fixed decode/encode schema. Decoding is gated on the
//! connection state: an id that is not registered for the current state is
//! rejected, and a payload that does not consume its whole frame is
//! rejected, both as protocol violations. Encoding is deterministic and
//! round-trips exactly with decoding.

use uuid::Uuid;

use crate::buffer::{PacketReader, PacketWriter};
use crate::state::ConnectionState;
use crate::ProtocolError;

/// Protocol version both sides must agree on during the handshake.
pub const PROTOCOL_VERSION: i32 = 3;

/// Maximum length of a chat message body.
pub const MAX_CHAT_LEN: usize = 256;

/// Maximum length of a username.
pub const MAX_USERNAME_LEN: usize = 16;

/// Maximum length of the server address echoed in the handshake.
pub const MAX_ADDRESS_LEN: usize = 255;

// ============================================================================
// Serverbound (client -> server)
// ============================================================================

/// Packets the server accepts, by state.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerboundPacket {
    // --- Handshake ---
    Handshake {
        protocol_version: i32,
        server_address: String,
        server_port: u16,
        next_state: i32,
    },

    // --- Status ---
    StatusRequest,
    Ping { payload: i64 },

    // --- Login ---
    LoginStart { username: String },

    // --- Play ---
    KeepAliveAck { id: i64 },
    Chat { message: String },
    PlayerMove { x: f64, y: f64, z: f64, on_ground: bool },
    BlockPlace { x: i32, y: i32, z: i32, block_id: i32 },
    BlockBreak { x: i32, y: i32, z: i32 },
}

impl ServerboundPacket {
    /// Numeric id within this packet's state.
    pub fn id(&self) -> i32 {
        match self {
            Self::Handshake { .. } => 0x00,
            Self::StatusRequest => 0x00,
            Self::Ping { .. } => 0x01,
            Self::LoginStart { .. } => 0x00,
            Self::KeepAliveAck { .. } => 0x00,
            Self::Chat { .. } => 0x01,
            Self::PlayerMove { .. } => 0x02,
            Self::BlockPlace { .. } => 0x03,
            Self::BlockBreak { .. } => 0x04,
        }
    }

    /// Decodes one frame body under the given state.
    pub fn decode(state: ConnectionState, body: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = PacketReader::new(body);
        let id = r.read_varint()?;
        let packet = match (state, id) {
            (ConnectionState::Handshake, 0x00) => Self::Handshake {
                protocol_version: r.read_varint()?,
                server_address: r.read_string(MAX_ADDRESS_LEN)?,
                server_port: r.read_u16()?,
                next_state: r.read_varint()?,
            },
            (ConnectionState::Status, 0x00) => Self::StatusRequest,
            (ConnectionState::Status, 0x01) => Self::Ping {
                payload: r.read_i64()?,
            },
            (ConnectionState::Login, 0x00) => Self::LoginStart {
                username: r.read_string(MAX_USERNAME_LEN)?,
            },
            (ConnectionState::Play, 0x00) => Self::KeepAliveAck { id: r.read_i64()? },
            (ConnectionState::Play, 0x01) => Self::Chat {
                message: r.read_string(MAX_CHAT_LEN)?,
            },
            (ConnectionState::Play, 0x02) => Self::PlayerMove {
                x: r.read_f64()?,
                y: r.read_f64()?,
                z: r.read_f64()?,
                on_ground: r.read_bool()?,
            },
            (ConnectionState::Play, 0x03) => Self::BlockPlace {
                x: r.read_i32()?,
                y: r.read_i32()?,
                z: r.read_i32()?,
                block_id: r.read_varint()?,
            },
            (ConnectionState::Play, 0x04) => Self::BlockBreak {
                x: r.read_i32()?,
                y: r.read_i32()?,
                z: r.read_i32()?,
            },
            _ => return Err(ProtocolError::UnknownPacketId { id, state }),
        };
        if r.remaining() != 0 {
            return Err(ProtocolError::TrailingBytes {
                id,
                remaining: r.remaining(),
            });
        }
        Ok(packet)
    }

    /// Encodes this packet into a frame body (id + payload).
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_varint(self.id());
        match self {
            Self::Handshake {
                protocol_version,
                server_address,
                server_port,
                next_state,
            } => {
                w.write_varint(*protocol_version);
                w.write_string(server_address);
                w.write_u16(*server_port);
                w.write_varint(*next_state);
            }
            Self::StatusRequest => {}
            Self::Ping { payload } => w.write_i64(*payload),
            Self::LoginStart { username } => w.write_string(username),
            Self::KeepAliveAck { id } => w.write_i64(*id),
            Self::Chat { message } => w.write_string(message),
            Self::PlayerMove { x, y, z, on_ground } => {
                w.write_f64(*x);
                w.write_f64(*y);
                w.write_f64(*z);
                w.write_bool(*on_ground);
            }
            Self::BlockPlace { x, y, z, block_id } => {
                w.write_i32(*x);
                w.write_i32(*y);
                w.write_i32(*z);
                w.write_varint(*block_id);
            }
            Self::BlockBreak { x, y, z } => {
                w.write_i32(*x);
                w.write_i32(*y);
                w.write_i32(*z);
            }
        }
        w.into_inner()
    }
}

// ============================================================================
// Clientbound (server -> client)
// ============================================================================

/// Packets the server emits, by state.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientboundPacket {
    // --- Status ---
    StatusResponse { json: String },
    Pong { payload: i64 },

    // --- Login ---
    LoginDisconnect { reason: String },
    LoginSuccess { uuid: Uuid, username: String },
    SetCompression { threshold: i32 },

    // --- Play ---
    KeepAlive { id: i64 },
    JoinGame { entity_id: i32, x: f64, y: f64, z: f64 },
    ChatBroadcast { sender: String, message: String },
    EntityMove { entity_id: i32, x: f64, y: f64, z: f64 },
    BlockChange { x: i32, y: i32, z: i32, block_id: i32 },
    Disconnect { reason: String },
}

impl ClientboundPacket {
    /// Numeric id within this packet's state.
    pub fn id(&self) -> i32 {
        match self {
            Self::StatusResponse { .. } => 0x00,
            Self::Pong { .. } => 0x01,
            Self::LoginDisconnect { .. } => 0x00,
            Self::LoginSuccess { .. } => 0x02,
            Self::SetCompression { .. } => 0x03,
            Self::KeepAlive { .. } => 0x00,
            Self::JoinGame { .. } => 0x01,
            Self::ChatBroadcast { .. } => 0x02,
            Self::EntityMove { .. } => 0x03,
            Self::BlockChange { .. } => 0x04,
            Self::Disconnect { .. } => 0x05,
        }
    }

    /// Decodes one frame body under the given state.
    ///
    /// The server never decodes clientbound packets itself; this is the
    /// round-trip counterpart used by test clients and tooling.
    pub fn decode(state: ConnectionState, body: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = PacketReader::new(body);
        let id = r.read_varint()?;
        let packet = match (state, id) {
            (ConnectionState::Status, 0x00) => Self::StatusResponse {
                json: r.read_string(crate::buffer::MAX_STRING_LEN)?,
            },
            (ConnectionState::Status, 0x01) => Self::Pong {
                payload: r.read_i64()?,
            },
            (ConnectionState::Login, 0x00) => Self::LoginDisconnect {
                reason: r.read_string(crate::buffer::MAX_STRING_LEN)?,
            },
            (ConnectionState::Login, 0x02) => Self::LoginSuccess {
                uuid: r.read_uuid()?,
                username: r.read_string(MAX_USERNAME_LEN)?,
            },
            (ConnectionState::Login, 0x03) => Self::SetCompression {
                threshold: r.read_varint()?,
            },
            (ConnectionState::Play, 0x00) => Self::KeepAlive { id: r.read_i64()? },
            (ConnectionState::Play, 0x01) => Self::JoinGame {
                entity_id: r.read_i32()?,
                x: r.read_f64()?,
                y: r.read_f64()?,
                z: r.read_f64()?,
            },
            (ConnectionState::Play, 0x02) => Self::ChatBroadcast {
                sender: r.read_string(MAX_USERNAME_LEN)?,
                message: r.read_string(MAX_CHAT_LEN)?,
            },
            (ConnectionState::Play, 0x03) => Self::EntityMove {
                entity_id: r.read_i32()?,
                x: r.read_f64()?,
                y: r.read_f64()?,
                z: r.read_f64()?,
            },
            (ConnectionState::Play, 0x04) => Self::BlockChange {
                x: r.read_i32()?,
                y: r.read_i32()?,
                z: r.read_i32()?,
                block_id: r.read_varint()?,
            },
            (ConnectionState::Play, 0x05) => Self::Disconnect {
                reason: r.read_string(crate::buffer::MAX_STRING_LEN)?,
            },
            _ => return Err(ProtocolError::UnknownPacketId { id, state }),
        };
        if r.remaining() != 0 {
            return Err(ProtocolError::TrailingBytes {
                id,
                remaining: r.remaining(),
            });
        }
        Ok(packet)
    }

    /// Encodes this packet into a frame body (id + payload).
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PacketWriter::new();
        w.write_varint(self.id());
        match self {
            Self::StatusResponse { json } => w.write_string(json),
            Self::Pong { payload } => w.write_i64(*payload),
            Self::LoginDisconnect { reason } => w.write_string(reason),
            Self::LoginSuccess { uuid, username } => {
                w.write_uuid(*uuid);
                w.write_string(username);
            }
            Self::SetCompression { threshold } => w.write_varint(*threshold),
            Self::KeepAlive { id } => w.write_i64(*id),
            Self::JoinGame { entity_id, x, y, z } => {
                w.write_i32(*entity_id);
                w.write_f64(*x);
                w.write_f64(*y);
                w.write_f64(*z);
            }
            Self::ChatBroadcast { sender, message } => {
                w.write_string(sender);
                w.write_string(message);
            }
            Self::EntityMove { entity_id, x, y, z } => {
                w.write_i32(*entity_id);
                w.write_f64(*x);
                w.write_f64(*y);
                w.write_f64(*z);
            }
            Self::BlockChange { x, y, z, block_id } => {
                w.write_i32(*x);
                w.write_i32(*y);
                w.write_i32(*z);
                w.write_varint(*block_id);
            }
            Self::Disconnect { reason } => w.write_string(reason),
        }
        w.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serverbound_roundtrip_per_state() {
        let cases = [
            (
                ConnectionState::Handshake,
                ServerboundPacket::Handshake {
                    protocol_version: PROTOCOL_VERSION,
                    server_address: "play.example.net".to_string(),
                    server_port: 25565,
                    next_state: 2,
                },
            ),
            (ConnectionState::Status, ServerboundPacket::StatusRequest),
            (
                ConnectionState::Status,
                ServerboundPacket::Ping { payload: -12345 },
            ),
            (
                ConnectionState::Login,
                ServerboundPacket::LoginStart {
                    username: "alice".to_string(),
                },
            ),
            (
                ConnectionState::Play,
                ServerboundPacket::KeepAliveAck { id: 42 },
            ),
            (
                ConnectionState::Play,
                ServerboundPacket::Chat {
                    message: "hello world".to_string(),
                },
            ),
            (
                ConnectionState::Play,
                ServerboundPacket::PlayerMove {
                    x: 1.5,
                    y: 64.0,
                    z: -3.25,
                    on_ground: true,
                },
            ),
            (
                ConnectionState::Play,
                ServerboundPacket::BlockPlace {
                    x: -10,
                    y: 70,
                    z: 255,
                    block_id: 3,
                },
            ),
            (
                ConnectionState::Play,
                ServerboundPacket::BlockBreak { x: 0, y: 64, z: 0 },
            ),
        ];
        for (state, packet) in cases {
            let body = packet.encode();
            let decoded = ServerboundPacket::decode(state, &body).unwrap();
            assert_eq!(decoded, packet, "in state {state}");
            // Encoding must be deterministic.
            assert_eq!(decoded.encode(), body);
        }
    }

    #[test]
    fn clientbound_roundtrip_per_state() {
        let cases = [
            (
                ConnectionState::Status,
                ClientboundPacket::StatusResponse {
                    json: r#"{"motd":"quarry"}"#.to_string(),
                },
            ),
            (
                ConnectionState::Login,
                ClientboundPacket::LoginSuccess {
                    uuid: Uuid::new_v4(),
                    username: "alice".to_string(),
                },
            ),
            (
                ConnectionState::Login,
                ClientboundPacket::SetCompression { threshold: 256 },
            ),
            (
                ConnectionState::Play,
                ClientboundPacket::JoinGame {
                    entity_id: 7,
                    x: 0.5,
                    y: 65.0,
                    z: 0.5,
                },
            ),
            (
                ConnectionState::Play,
                ClientboundPacket::Disconnect {
                    reason: "shutting down".to_string(),
                },
            ),
        ];
        for (state, packet) in cases {
            let body = packet.encode();
            let decoded = ClientboundPacket::decode(state, &body).unwrap();
            assert_eq!(decoded, packet);
            assert_eq!(decoded.encode(), body);
        }
    }

    #[test]
    fn out_of_state_id_is_a_violation() {
        // A Play-state chat frame presented while still in Handshake.
        let body = ServerboundPacket::Chat {
            message: "early".to_string(),
        }
        .encode();
        let err = ServerboundPacket::decode(ConnectionState::Handshake, &body);
        assert!(matches!(
            err,
            Err(ProtocolError::UnknownPacketId {
                id: 0x01,
                state: ConnectionState::Handshake
            })
        ));
    }

    #[test]
    fn trailing_bytes_are_a_violation() {
        let mut body = ServerboundPacket::KeepAliveAck { id: 1 }.encode();
        body.push(0xFF);
        let err = ServerboundPacket::decode(ConnectionState::Play, &body);
        assert!(matches!(
            err,
            Err(ProtocolError::TrailingBytes { id: 0x00, remaining: 1 })
        ));
    }

    #[test]
    fn truncated_payload_is_a_violation() {
        let body = ServerboundPacket::PlayerMove {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            on_ground: false,
        }
        .encode();
        let err = ServerboundPacket::decode(ConnectionState::Play, &body[..body.len() - 4]);
        assert!(matches!(err, Err(ProtocolError::UnexpectedEof(_))));
    }
}
