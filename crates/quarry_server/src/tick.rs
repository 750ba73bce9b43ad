//! The tick loop: the single logical thread that owns all world-mutating
//! state.
//!
//! Each tick runs four phases in order:
//!
//! 1. **Inbound**: drain the transport queue; decoded packets become
//!    events, dispatch decides acceptance, accepted mutations are queued
//!    on the world.
//! 2. **Tasks**: run due scheduled tasks.
//! 3. **Simulation**: apply queued mutations and keepalive bookkeeping.
//! 4. **Flush**: turn applied changes into packets on the writer queues.
//!
//! This is the only place events are dispatched and tasks run. Overruns
//! are absorbed as lag: a slow tick logs a warning past the configured
//! multiplier and the loop proceeds without sleeping, never double-running
//! a tick number. The watchdog heartbeat is beaten once per iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use quarry_events::EventBus;
use quarry_protocol::packet::{
    ClientboundPacket, ServerboundPacket, PROTOCOL_VERSION,
};
use quarry_protocol::state::ConnectionState;
use quarry_tasks::TaskScheduler;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionId, ConnectionManager, DisconnectReason};
use crate::events::{
    BlockBreakEvent, BlockPlaceEvent, PlayerChatEvent, PlayerJoinEvent, PlayerMoveEvent,
    PlayerQuitEvent, TickStartEvent,
};
use crate::network::{InboundEvent, InboundReceiver, INBOUND_QUEUE_DEPTH};
use crate::types::{BlockPos, PlayerId, Position};
use crate::watchdog::Heartbeat;
use crate::world::{World, WorldChange, AIR, SPAWN};

/// Everything the tick thread owns, and the context scheduled tasks run
/// against.
pub struct GameState {
    pub config: ServerConfig,
    pub world: World,
    pub connections: ConnectionManager,
    pub bus: Arc<EventBus>,
    pub scheduler: TaskScheduler<GameState>,
    pub tick: u64,
}

impl GameState {
    pub fn new(config: ServerConfig, bus: Arc<EventBus>, scheduler: TaskScheduler<GameState>) -> Self {
        Self {
            config,
            world: World::new(),
            connections: ConnectionManager::new(),
            bus,
            scheduler,
            tick: 0,
        }
    }

    /// Status-response payload for the server list.
    pub fn status_json(&self) -> String {
        json!({
            "version": { "protocol": PROTOCOL_VERSION },
            "players": {
                "online": self.world.player_count(),
                "max": self.config.max_connections,
            },
            "description": { "text": self.config.motd },
        })
        .to_string()
    }

    /// Sends a goodbye packet appropriate to the connection's state, then
    /// tears the connection down. Safe to call twice; the second call is a
    /// no-op.
    pub fn kick(&mut self, id: ConnectionId, reason: DisconnectReason) {
        if let Some(conn) = self.connections.get(id) {
            let text = reason.to_string();
            match conn.state {
                ConnectionState::Login => {
                    conn.send(ClientboundPacket::LoginDisconnect { reason: text })
                }
                ConnectionState::Play => conn.send(ClientboundPacket::Disconnect { reason: text }),
                _ => {}
            }
        }
        self.teardown(id, reason);
    }

    /// Idempotent teardown: releases the entity, closes the writer, and
    /// emits `PlayerQuitEvent` exactly once per connection, whichever
    /// path gets here first.
    pub fn teardown(&mut self, id: ConnectionId, reason: DisconnectReason) {
        let Some(conn) = self.connections.remove(id) else {
            return;
        };
        conn.close_writer();
        debug!("{id} torn down: {reason}");
        if let (Some(player), Some(username)) = (conn.player, conn.username) {
            self.world.release_entity(player);
            let mut quit = PlayerQuitEvent {
                player,
                username,
                reason,
            };
            self.bus.dispatch(&mut quit);
        }
    }
}

/// Upper bound on transport events handled in one inbound phase.
const MAX_INBOUND_PER_TICK: usize = INBOUND_QUEUE_DEPTH;

/// The tick loop driver. Constructed by the server, consumed by `run`.
pub struct TickLoop {
    state: GameState,
    inbound_rx: InboundReceiver,
    shutdown: Arc<AtomicBool>,
    heartbeat: Heartbeat,
}

impl TickLoop {
    pub fn new(
        state: GameState,
        inbound_rx: InboundReceiver,
        shutdown: Arc<AtomicBool>,
        heartbeat: Heartbeat,
    ) -> Self {
        Self {
            state,
            inbound_rx,
            shutdown,
            heartbeat,
        }
    }

    /// Runs ticks until shutdown is requested, then drains: disconnects
    /// every connection with a shutdown reason and cancels all tasks.
    pub fn run(mut self) {
        let budget = self.state.config.tick_duration();
        let warn_at = budget.mul_f64(self.state.config.tick_warn_multiplier.max(1.0));
        info!(
            "Tick loop running at {} TPS ({budget:?} budget)",
            self.state.config.tick_rate
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            self.heartbeat.beat();
            let started = Instant::now();

            self.state.bus.dispatch(&mut TickStartEvent {
                tick: self.state.tick,
            });
            self.drain_inbound();
            let inbound_done = started.elapsed();
            let scheduler = self.state.scheduler.clone();
            scheduler.run_due(self.state.tick, &mut self.state);
            let tasks_done = started.elapsed();
            let changes = self.simulate();
            let simulate_done = started.elapsed();
            self.flush(&changes);

            let elapsed = started.elapsed();
            if elapsed > warn_at {
                warn!(
                    "Tick {} took {elapsed:?} (inbound {:?}, tasks {:?}, simulate {:?}, flush {:?}); budget is {budget:?}, running behind",
                    self.state.tick,
                    inbound_done,
                    tasks_done - inbound_done,
                    simulate_done - tasks_done,
                    elapsed - simulate_done,
                );
            }
            self.state.tick += 1;
            if let Some(remaining) = budget.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
            // Behind budget: proceed immediately, absorbing the lag.
        }

        self.drain_shutdown();
    }

    fn drain_shutdown(&mut self) {
        info!("Tick loop stopping; disconnecting {} connections", self.state.connections.len());
        for id in self.state.connections.ids() {
            self.state.kick(id, DisconnectReason::ServerShutdown);
        }
        let cancelled = self.state.scheduler.clear();
        if cancelled > 0 {
            debug!("Cancelled {cancelled} outstanding tasks at shutdown");
        }
        self.heartbeat.disarm();
    }

    // ========================================================================
    // Phase 1: inbound
    // ========================================================================

    fn drain_inbound(&mut self) {
        self.drain_inbound_up_to(MAX_INBOUND_PER_TICK);
    }

    /// Drains at most `limit` transport events. The cap keeps the inbound
    /// phase bounded even while reader tasks keep refilling the channel;
    /// the remainder waits for the next tick.
    fn drain_inbound_up_to(&mut self, limit: usize) {
        for _ in 0..limit {
            let Ok(event) = self.inbound_rx.try_recv() else {
                return;
            };
            match event {
                InboundEvent::Connected {
                    id,
                    remote_addr,
                    writer_tx,
                    reader_ctl,
                } => {
                    if self.state.connections.len() >= self.state.config.max_connections {
                        // Table full; refuse before the handshake even lands.
                        warn!("Refusing {id} from {remote_addr}: connection table full");
                        let conn =
                            Connection::new(id, remote_addr, writer_tx, reader_ctl, self.state.tick);
                        conn.close_writer();
                        continue;
                    }
                    self.state.connections.insert(Connection::new(
                        id,
                        remote_addr,
                        writer_tx,
                        reader_ctl,
                        self.state.tick,
                    ));
                }
                InboundEvent::Packet { id, packet } => self.handle_packet(id, packet),
                InboundEvent::Disconnected { id, reason } => self.state.teardown(id, reason),
            }
        }
    }

    fn handle_packet(&mut self, id: ConnectionId, packet: ServerboundPacket) {
        // A packet may race a tick-side teardown; drop it silently.
        if self.state.connections.get(id).is_none() {
            return;
        }
        match packet {
            ServerboundPacket::Handshake {
                protocol_version,
                next_state,
                ..
            } => self.handle_handshake(id, protocol_version, next_state),
            ServerboundPacket::StatusRequest => {
                let status = self.state.status_json();
                self.state
                    .connections
                    .send_to(id, ClientboundPacket::StatusResponse { json: status });
            }
            ServerboundPacket::Ping { payload } => {
                self.state
                    .connections
                    .send_to(id, ClientboundPacket::Pong { payload });
            }
            ServerboundPacket::LoginStart { username } => self.handle_login(id, username),
            ServerboundPacket::KeepAliveAck { id: ack } => self.handle_keepalive_ack(id, ack),
            ServerboundPacket::Chat { message } => self.handle_chat(id, message),
            ServerboundPacket::PlayerMove { x, y, z, .. } => {
                self.handle_move(id, Position::new(x, y, z))
            }
            ServerboundPacket::BlockPlace { x, y, z, block_id } => {
                self.handle_block_place(id, BlockPos::new(x, y, z), block_id)
            }
            ServerboundPacket::BlockBreak { x, y, z } => {
                self.handle_block_break(id, BlockPos::new(x, y, z))
            }
        }
    }

    fn handle_handshake(&mut self, id: ConnectionId, protocol_version: i32, next_state: i32) {
        let Some(state) = self.state.connections.get(id).map(|c| c.state) else {
            return;
        };
        if state != ConnectionState::Handshake {
            self.state.kick(
                id,
                DisconnectReason::ProtocolViolation(format!(
                    "handshake packet in the {state:?} state"
                )),
            );
            return;
        }
        let Some(next) = ConnectionState::from_handshake_next(next_state) else {
            self.state.kick(
                id,
                DisconnectReason::ProtocolViolation(format!(
                    "handshake requested unknown state {next_state}"
                )),
            );
            return;
        };
        if let Some(conn) = self.state.connections.get_mut(id) {
            conn.protocol_version = protocol_version;
            conn.state = next;
        }
    }

    fn handle_login(&mut self, id: ConnectionId, username: String) {
        let Some((state, got)) = self
            .state
            .connections
            .get(id)
            .map(|c| (c.state, c.protocol_version))
        else {
            return;
        };
        // A client pipelining a second LoginStart behind the first reaches
        // here already in Play; out-of-state packets are always violations.
        if state != ConnectionState::Login {
            self.state.kick(
                id,
                DisconnectReason::ProtocolViolation(format!(
                    "login start in the {state:?} state"
                )),
            );
            return;
        }
        if got != PROTOCOL_VERSION {
            self.state.kick(
                id,
                DisconnectReason::Kicked(format!(
                    "incompatible protocol version {got} (server speaks {PROTOCOL_VERSION})"
                )),
            );
            return;
        }
        if username.is_empty() || !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.state.kick(
                id,
                DisconnectReason::ProtocolViolation(format!("invalid username {username:?}")),
            );
            return;
        }
        if self.state.world.player_count() >= self.state.config.max_connections {
            self.state
                .kick(id, DisconnectReason::Kicked("server is full".to_string()));
            return;
        }
        let player = PlayerId::offline(&username);
        if self.state.connections.by_player(player).is_some() {
            self.state.kick(
                id,
                DisconnectReason::Kicked(format!("{username} is already logged in")),
            );
            return;
        }

        let threshold = self.state.config.compression_threshold;
        let Some(conn) = self.state.connections.get_mut(id) else {
            return;
        };
        if threshold >= 0 {
            // SetCompression itself goes out before the writer switches.
            conn.send(ClientboundPacket::SetCompression { threshold });
            conn.enable_compression(threshold);
        }
        conn.send(ClientboundPacket::LoginSuccess {
            uuid: player.0,
            username: username.clone(),
        });
        conn.set_reader_state(ConnectionState::Play);
        conn.state = ConnectionState::Play;
        conn.username = Some(username.clone());
        conn.last_ack_tick = self.state.tick;

        let entity = self.state.world.bind_entity(player);
        self.state.connections.bind_player(id, player);
        if let Some(conn) = self.state.connections.get_mut(id) {
            conn.entity = Some(entity);
            conn.send(ClientboundPacket::JoinGame {
                entity_id: entity.0 as i32,
                x: SPAWN.x,
                y: SPAWN.y,
                z: SPAWN.z,
            });
        }
        info!("{username} ({player}) joined as {entity} via {id}");

        let mut join = PlayerJoinEvent {
            player,
            username,
            spawn: SPAWN,
        };
        self.state.bus.dispatch(&mut join);
    }

    fn handle_keepalive_ack(&mut self, id: ConnectionId, ack: i64) {
        let tick = self.state.tick;
        let violation = {
            let Some(conn) = self.state.connections.get_mut(id) else {
                return;
            };
            match conn.pending_keepalive {
                Some(expected) if expected == ack => {
                    conn.pending_keepalive = None;
                    conn.last_ack_tick = tick;
                    None
                }
                Some(expected) => Some(format!(
                    "keepalive id mismatch: expected {expected}, got {ack}"
                )),
                None => Some("unsolicited keepalive ack".to_string()),
            }
        };
        if let Some(detail) = violation {
            self.state
                .kick(id, DisconnectReason::ProtocolViolation(detail));
        }
    }

    fn handle_chat(&mut self, id: ConnectionId, message: String) {
        let Some((player, username)) = self.play_identity(id) else {
            return;
        };
        let mut event = PlayerChatEvent::new(player, username, message);
        let outcome = self.state.bus.dispatch(&mut event);
        if outcome.cancelled {
            debug!("Chat from {} suppressed by a listener", event.username);
            return;
        }
        let packet = ClientboundPacket::ChatBroadcast {
            sender: event.username,
            message: event.message,
        };
        self.state.connections.broadcast_play(&packet);
    }

    fn handle_move(&mut self, id: ConnectionId, to: Position) {
        let Some((player, _)) = self.play_identity(id) else {
            return;
        };
        let Some(from) = self.state.world.position_of(player) else {
            return;
        };
        let Some(entity) = self.state.world.entity_of(player) else {
            return;
        };
        let mut event = PlayerMoveEvent::new(player, from, to);
        let outcome = self.state.bus.dispatch(&mut event);
        if outcome.cancelled {
            // Snap the client back where it was.
            self.state.connections.send_to(
                id,
                ClientboundPacket::EntityMove {
                    entity_id: entity.0 as i32,
                    x: from.x,
                    y: from.y,
                    z: from.z,
                },
            );
            return;
        }
        self.state.world.queue_move(entity, event.to);
    }

    fn handle_block_place(&mut self, id: ConnectionId, position: BlockPos, block_id: i32) {
        let Some((player, _)) = self.play_identity(id) else {
            return;
        };
        let Ok(block_id) = u16::try_from(block_id) else {
            self.state.kick(
                id,
                DisconnectReason::ProtocolViolation(format!("block id {block_id} out of range")),
            );
            return;
        };
        if block_id == AIR {
            self.state.kick(
                id,
                DisconnectReason::ProtocolViolation("cannot place air".to_string()),
            );
            return;
        }
        let mut event = BlockPlaceEvent::new(player, position, block_id);
        let outcome = self.state.bus.dispatch(&mut event);
        if outcome.cancelled {
            self.send_corrective_block(id, position);
            return;
        }
        self.state.world.queue_block(event.position, event.block_id);
    }

    fn handle_block_break(&mut self, id: ConnectionId, position: BlockPos) {
        let Some((player, _)) = self.play_identity(id) else {
            return;
        };
        let mut event = BlockBreakEvent::new(player, position);
        let outcome = self.state.bus.dispatch(&mut event);
        if outcome.cancelled {
            self.send_corrective_block(id, position);
            return;
        }
        self.state.world.queue_block(event.position, AIR);
    }

    /// Re-sends the authoritative block so a client whose mutation was
    /// vetoed does not render a phantom change.
    fn send_corrective_block(&mut self, id: ConnectionId, position: BlockPos) {
        let current = self.state.world.block_at(position);
        self.state.connections.send_to(
            id,
            ClientboundPacket::BlockChange {
                x: position.x,
                y: position.y,
                z: position.z,
                block_id: i32::from(current),
            },
        );
    }

    /// Player identity of a Play-state connection; `None` drops packets
    /// from connections that never finished login.
    fn play_identity(&self, id: ConnectionId) -> Option<(PlayerId, String)> {
        let conn = self.state.connections.get(id)?;
        if conn.state != ConnectionState::Play {
            return None;
        }
        Some((conn.player?, conn.username.clone()?))
    }

    // ========================================================================
    // Phase 3: simulation
    // ========================================================================

    fn simulate(&mut self) -> Vec<WorldChange> {
        self.keepalive_sweep();
        self.state.world.step()
    }

    fn keepalive_sweep(&mut self) {
        let tick = self.state.tick;
        let interval = self.state.config.keepalive_interval_ticks;
        let timeout = self.state.config.keepalive_timeout_ticks;

        let mut timed_out = Vec::new();
        for conn in self.state.connections.iter_mut() {
            if conn.state != ConnectionState::Play {
                continue;
            }
            let silent_for = tick.saturating_sub(conn.last_ack_tick);
            if silent_for >= timeout {
                timed_out.push(conn.id);
            } else if conn.pending_keepalive.is_none() && silent_for >= interval {
                let id = tick as i64;
                conn.pending_keepalive = Some(id);
                conn.send(ClientboundPacket::KeepAlive { id });
            }
        }
        for id in timed_out {
            warn!("{id} missed keepalive window ({timeout} ticks); disconnecting");
            self.state.kick(id, DisconnectReason::Timeout);
        }
    }

    // ========================================================================
    // Phase 4: flush
    // ========================================================================

    fn flush(&mut self, changes: &[WorldChange]) {
        for change in changes {
            match *change {
                WorldChange::EntityMoved { entity, position } => {
                    let packet = ClientboundPacket::EntityMove {
                        entity_id: entity.0 as i32,
                        x: position.x,
                        y: position.y,
                        z: position.z,
                    };
                    // The mover already knows; everyone else learns here.
                    let owner = self
                        .state
                        .connections
                        .iter()
                        .find(|c| c.entity == Some(entity))
                        .map(|c| c.id);
                    match owner {
                        Some(owner) => self.state.connections.broadcast_play_except(owner, &packet),
                        None => self.state.connections.broadcast_play(&packet),
                    }
                }
                WorldChange::BlockChanged { position, block_id } => {
                    self.state.connections.broadcast_play(&ClientboundPacket::BlockChange {
                        x: position.x,
                        y: position.y,
                        z: position.z,
                        block_id: i32::from(block_id),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{inbound_channel, InboundSender, ReaderControl, WriterCommand};
    use quarry_events::EventPriority;
    use quarry_events::PluginId;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn test_state() -> GameState {
        GameState::new(
            ServerConfig::default(),
            Arc::new(EventBus::new()),
            TaskScheduler::new(),
        )
    }

    fn test_loop() -> (TickLoop, InboundSender) {
        let (inbound_tx, inbound_rx) = inbound_channel();
        let tick_loop = TickLoop::new(
            test_state(),
            inbound_rx,
            Arc::new(AtomicBool::new(false)),
            Heartbeat::new(),
        );
        (tick_loop, inbound_tx)
    }

    fn fresh_connection(state: &mut GameState, raw_id: u64) -> ConnectionId {
        let (writer_tx, _writer_rx) = mpsc::unbounded_channel();
        let (reader_tx, _reader_rx) = mpsc::unbounded_channel();
        let id = ConnectionId(raw_id);
        let addr = "127.0.0.1:40000".parse().unwrap();
        state
            .connections
            .insert(Connection::new(id, addr, writer_tx, reader_tx, 0));
        id
    }

    type WriterRx = mpsc::UnboundedReceiver<WriterCommand>;
    type ReaderRx = mpsc::UnboundedReceiver<ReaderControl>;

    fn fake_play_connection(state: &mut GameState, raw_id: u64, name: &str) -> (ConnectionId, WriterRx, ReaderRx) {
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (reader_tx, reader_rx) = mpsc::unbounded_channel();
        let id = ConnectionId(raw_id);
        let addr = "127.0.0.1:40000".parse().unwrap();
        state
            .connections
            .insert(Connection::new(id, addr, writer_tx, reader_tx, 0));

        let player = PlayerId::offline(name);
        let entity = state.world.bind_entity(player);
        state.connections.bind_player(id, player);
        let conn = state.connections.get_mut(id).unwrap();
        conn.state = ConnectionState::Play;
        conn.username = Some(name.to_string());
        conn.entity = Some(entity);
        (id, writer_rx, reader_rx)
    }

    #[test]
    fn teardown_emits_exactly_one_quit_event() {
        let mut state = test_state();
        let quits = Arc::new(Mutex::new(Vec::new()));
        {
            let quits = quits.clone();
            state
                .bus
                .register::<PlayerQuitEvent, _>(
                    PluginId::new(),
                    "count-quits",
                    EventPriority::Monitor,
                    false,
                    move |event| {
                        quits.lock().unwrap().push(event.reason.clone());
                        Ok(())
                    },
                )
                .unwrap();
        }

        let (id, _writer_rx, _reader_rx) = fake_play_connection(&mut state, 0, "steve");
        assert_eq!(state.world.player_count(), 1);

        // Two teardown paths racing (reader error vs. tick-side timeout):
        // only the first takes effect.
        state.teardown(id, DisconnectReason::ClientQuit);
        state.teardown(id, DisconnectReason::Timeout);

        let quits = quits.lock().unwrap();
        assert_eq!(quits.as_slice(), [DisconnectReason::ClientQuit]);
        assert_eq!(state.world.player_count(), 0);
        assert_eq!(state.connections.len(), 0);
    }

    #[test]
    fn pipelined_second_login_is_a_violation_and_leaks_nothing() {
        let (mut tick_loop, _inbound_tx) = test_loop();
        let id = fresh_connection(&mut tick_loop.state, 0);

        tick_loop.handle_packet(
            id,
            ServerboundPacket::Handshake {
                protocol_version: PROTOCOL_VERSION,
                server_address: "localhost".to_string(),
                server_port: 25600,
                next_state: 2,
            },
        );
        tick_loop.handle_packet(
            id,
            ServerboundPacket::LoginStart {
                username: "alice".to_string(),
            },
        );
        assert_eq!(tick_loop.state.world.player_count(), 1);

        // A second LoginStart pipelined in the same segment arrives after
        // the connection already reached Play; it must kick the peer, not
        // rebind it, and alice's entity must be released on teardown.
        tick_loop.handle_packet(
            id,
            ServerboundPacket::LoginStart {
                username: "bob".to_string(),
            },
        );
        assert_eq!(tick_loop.state.connections.len(), 0);
        assert_eq!(tick_loop.state.world.player_count(), 0);
        assert!(tick_loop
            .state
            .world
            .entity_of(PlayerId::offline("alice"))
            .is_none());
        assert!(tick_loop
            .state
            .world
            .entity_of(PlayerId::offline("bob"))
            .is_none());
    }

    #[test]
    fn repeated_handshake_is_a_violation() {
        let (mut tick_loop, _inbound_tx) = test_loop();
        let id = fresh_connection(&mut tick_loop.state, 0);

        let handshake = ServerboundPacket::Handshake {
            protocol_version: PROTOCOL_VERSION,
            server_address: "localhost".to_string(),
            server_port: 25600,
            next_state: 1,
        };
        tick_loop.handle_packet(id, handshake.clone());
        assert_eq!(
            tick_loop.state.connections.get(id).unwrap().state,
            ConnectionState::Status
        );

        tick_loop.handle_packet(id, handshake);
        assert_eq!(tick_loop.state.connections.len(), 0);
    }

    #[test]
    fn inbound_drain_is_bounded_per_call() {
        let (mut tick_loop, inbound_tx) = test_loop();
        for _ in 0..5 {
            // Packets for an unknown connection are dropped silently, so
            // only the drain count matters here.
            inbound_tx
                .try_send(InboundEvent::Packet {
                    id: ConnectionId(9),
                    packet: ServerboundPacket::StatusRequest,
                })
                .unwrap();
        }

        tick_loop.drain_inbound_up_to(3);
        assert!(tick_loop.inbound_rx.try_recv().is_ok());
        assert!(tick_loop.inbound_rx.try_recv().is_ok());
        assert!(tick_loop.inbound_rx.try_recv().is_err());
    }

    #[test]
    fn kick_sends_goodbye_before_closing() {
        let mut state = test_state();
        let (id, mut writer_rx, _reader_rx) = fake_play_connection(&mut state, 0, "steve");

        state.kick(id, DisconnectReason::Kicked("rule breaking".to_string()));

        match writer_rx.try_recv().unwrap() {
            WriterCommand::Send(ClientboundPacket::Disconnect { reason }) => {
                assert!(reason.contains("rule breaking"));
            }
            other => panic!("expected Disconnect, got {other:?}"),
        }
        assert!(matches!(
            writer_rx.try_recv().unwrap(),
            WriterCommand::Close
        ));
    }
}
