//! Connection table and per-connection bookkeeping.
//!
//! The [`ConnectionManager`] lives on the tick thread and is the single
//! authority on connection state. Socket I/O happens in per-connection
//! tokio tasks; the manager talks to them only through the writer and
//! reader-control channels, so nothing here ever blocks on the network.

use std::collections::HashMap;
use std::net::SocketAddr;

use quarry_protocol::packet::ClientboundPacket;
use quarry_protocol::state::ConnectionState;
use tracing::debug;

use crate::network::{ReaderControl, ReaderCtlSender, WriterCommand, WriterSender};
use crate::types::{EntityId, PlayerId};

/// Identity of one accepted TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Why a connection was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the socket or the transport failed.
    ClientQuit,
    /// No keepalive acknowledgment within the timeout window.
    Timeout,
    /// The peer violated the wire protocol.
    ProtocolViolation(String),
    /// The server is shutting down.
    ServerShutdown,
    /// A plugin or the server kicked the player.
    Kicked(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientQuit => f.write_str("client quit"),
            Self::Timeout => f.write_str("keepalive timeout"),
            Self::ProtocolViolation(detail) => write!(f, "protocol violation: {detail}"),
            Self::ServerShutdown => f.write_str("server shutting down"),
            Self::Kicked(reason) => write!(f, "kicked: {reason}"),
        }
    }
}

/// Tick-thread view of one connection.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub remote_addr: SocketAddr,
    pub state: ConnectionState,
    /// Protocol version announced in the handshake; 0 until then.
    pub protocol_version: i32,
    pub username: Option<String>,
    pub player: Option<PlayerId>,
    pub entity: Option<EntityId>,
    /// Tick of the last keepalive acknowledgment (or login, initially).
    pub last_ack_tick: u64,
    /// Outstanding keepalive id awaiting acknowledgment.
    pub pending_keepalive: Option<i64>,
    writer_tx: WriterSender,
    reader_ctl: ReaderCtlSender,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        remote_addr: SocketAddr,
        writer_tx: WriterSender,
        reader_ctl: ReaderCtlSender,
        current_tick: u64,
    ) -> Self {
        Self {
            id,
            remote_addr,
            state: ConnectionState::Handshake,
            protocol_version: 0,
            username: None,
            player: None,
            entity: None,
            last_ack_tick: current_tick,
            pending_keepalive: None,
            writer_tx,
            reader_ctl,
        }
    }

    /// Queues a packet to the writer task. Errors (task gone) are ignored;
    /// the reader task reports the disconnect through the inbound queue.
    pub fn send(&self, packet: ClientboundPacket) {
        let _ = self.writer_tx.send(WriterCommand::Send(packet));
    }

    /// Switches both transport halves to compressed framing. Ordered after
    /// any packet already queued, so `SetCompression` itself goes out
    /// uncompressed.
    pub fn enable_compression(&self, threshold: i32) {
        let _ = self.writer_tx.send(WriterCommand::EnableCompression(threshold));
        let _ = self.reader_ctl.send(ReaderControl::EnableCompression(threshold));
    }

    /// Tells the reader task which packet space to decode next.
    pub fn set_reader_state(&self, state: ConnectionState) {
        let _ = self.reader_ctl.send(ReaderControl::SetState(state));
    }

    /// Asks the writer task to flush and close the socket.
    pub fn close_writer(&self) {
        let _ = self.writer_tx.send(WriterCommand::Close);
    }
}

/// The connection table. Keyed by [`ConnectionId`], with a side index by
/// player identity for Play-state connections.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: HashMap<ConnectionId, Connection>,
    by_player: HashMap<PlayerId, ConnectionId>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, connection: Connection) {
        debug!("{} registered from {}", connection.id, connection.remote_addr);
        self.connections.insert(connection.id, connection);
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn by_player(&self, player: PlayerId) -> Option<&Connection> {
        self.by_player.get(&player).and_then(|id| self.connections.get(id))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }

    /// Records a login identity so broadcasts and lookups can go by player.
    pub fn bind_player(&mut self, id: ConnectionId, player: PlayerId) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.player = Some(player);
            self.by_player.insert(player, id);
        }
    }

    pub fn send_to(&self, id: ConnectionId, packet: ClientboundPacket) {
        if let Some(conn) = self.connections.get(&id) {
            conn.send(packet);
        }
    }

    /// Sends to every Play-state connection.
    pub fn broadcast_play(&self, packet: &ClientboundPacket) {
        for conn in self.connections.values() {
            if conn.state == ConnectionState::Play {
                conn.send(packet.clone());
            }
        }
    }

    /// Sends to every Play-state connection except `skip`.
    pub fn broadcast_play_except(&self, skip: ConnectionId, packet: &ClientboundPacket) {
        for conn in self.connections.values() {
            if conn.id != skip && conn.state == ConnectionState::Play {
                conn.send(packet.clone());
            }
        }
    }

    /// Removes a connection from the table, marking it disconnected.
    ///
    /// Returns `None` if the connection was already removed, which is what
    /// makes teardown idempotent: whichever path gets here second (reader
    /// task error vs. tick-thread kick) sees nothing left to do.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let mut conn = self.connections.remove(&id)?;
        conn.state = ConnectionState::Disconnected;
        if let Some(player) = conn.player {
            self.by_player.remove(&player);
        }
        Some(conn)
    }
}
