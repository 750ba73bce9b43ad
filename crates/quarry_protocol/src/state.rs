//! Connection protocol states.

/// The protocol state a connection is in.
///
/// Packet ids are only meaningful relative to a state; decoding is gated on
/// it, and an id arriving in the wrong state is a protocol violation. State
/// transitions are driven by specific packets: `Handshake` selects `Status`
/// or `Login` via its `next_state` field, and a successful login moves the
/// connection to `Play`. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Handshake,
    Status,
    Login,
    Play,
    Disconnected,
}

impl ConnectionState {
    /// Resolves the `next_state` field of a handshake packet.
    ///
    /// Only `Status` (1) and `Login` (2) are reachable from the handshake;
    /// anything else is a violation the caller must treat as such.
    pub fn from_handshake_next(next_state: i32) -> Option<Self> {
        match next_state {
            1 => Some(Self::Status),
            2 => Some(Self::Login),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Handshake => "handshake",
            Self::Status => "status",
            Self::Login => "login",
            Self::Play => "play",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}
