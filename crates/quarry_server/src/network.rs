//! Async transport edge: acceptor and per-connection I/O tasks.
//!
//! Socket work happens in tokio tasks; the tick thread never touches a
//! socket. A reader task decodes frames and *enqueues* typed packets on the
//! inbound channel; dispatch happens only on the tick thread. A writer
//! task drains its command channel and encodes onto the socket, so the
//! flush phase never blocks on a slow peer.
//!
//! The reader tracks its own copy of the connection state so it knows
//! which packet space to decode. State changes decided on the tick thread
//! (login completing, compression enabling) arrive over the reader-control
//! channel; the handshake's state switch the reader applies itself, since
//! the very next frame is already in the new space.

use std::net::SocketAddr;

use quarry_protocol::crypto::cipher_pair;
use quarry_protocol::framing::{FrameDecoder, FrameEncoder};
use quarry_protocol::packet::{ClientboundPacket, ServerboundPacket};
use quarry_protocol::state::ConnectionState;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::connection::{ConnectionId, DisconnectReason};

/// Inbound queue depth. Producers (reader tasks) await when the tick
/// thread falls behind, which is the backpressure we want.
pub const INBOUND_QUEUE_DEPTH: usize = 1024;

/// Commands to a connection's writer task.
#[derive(Debug)]
pub enum WriterCommand {
    Send(ClientboundPacket),
    /// Switch to compressed framing for every later packet.
    EnableCompression(i32),
    /// Flush and close the socket.
    Close,
}

/// Commands to a connection's reader task.
#[derive(Debug)]
pub enum ReaderControl {
    SetState(ConnectionState),
    EnableCompression(i32),
}

/// Events flowing from the transport tasks to the tick thread.
#[derive(Debug)]
pub enum InboundEvent {
    Connected {
        id: ConnectionId,
        remote_addr: SocketAddr,
        writer_tx: WriterSender,
        reader_ctl: ReaderCtlSender,
    },
    Packet {
        id: ConnectionId,
        packet: ServerboundPacket,
    },
    Disconnected {
        id: ConnectionId,
        reason: DisconnectReason,
    },
}

pub type WriterSender = mpsc::UnboundedSender<WriterCommand>;
pub type ReaderCtlSender = mpsc::UnboundedSender<ReaderControl>;
pub type InboundSender = mpsc::Sender<InboundEvent>;
pub type InboundReceiver = mpsc::Receiver<InboundEvent>;

pub fn inbound_channel() -> (InboundSender, InboundReceiver) {
    mpsc::channel(INBOUND_QUEUE_DEPTH)
}

/// Accept loop. Runs until the listener errors or the task is aborted on
/// shutdown.
pub async fn run_acceptor(
    listener: TcpListener,
    inbound_tx: InboundSender,
    cipher_key: Option<[u8; 16]>,
) {
    let mut next_id = 0u64;
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {e}");
                continue;
            }
        };
        let id = ConnectionId(next_id);
        next_id += 1;
        debug!("{id} accepted from {remote_addr}");
        spawn_connection(id, stream, remote_addr, inbound_tx.clone(), cipher_key).await;
    }
}

/// Wires up one accepted socket: registers the connection with the tick
/// thread, then spawns its reader and writer tasks.
pub async fn spawn_connection(
    id: ConnectionId,
    stream: TcpStream,
    remote_addr: SocketAddr,
    inbound_tx: InboundSender,
    cipher_key: Option<[u8; 16]>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("{id}: failed to set TCP_NODELAY: {e}");
    }
    let (read_half, write_half) = stream.into_split();

    let mut decoder = FrameDecoder::new();
    let mut encoder = FrameEncoder::new();
    if let Some(key) = cipher_key {
        // The key length was validated at config load.
        if let Ok((enc, dec)) = cipher_pair(&key) {
            encoder.enable_encryption(enc);
            decoder.enable_encryption(dec);
        }
    }

    let (writer_tx, writer_rx) = mpsc::unbounded_channel();
    let (reader_ctl_tx, reader_ctl_rx) = mpsc::unbounded_channel();

    if inbound_tx
        .send(InboundEvent::Connected {
            id,
            remote_addr,
            writer_tx,
            reader_ctl: reader_ctl_tx,
        })
        .await
        .is_err()
    {
        // Tick thread already gone; drop the socket.
        return;
    }

    tokio::spawn(run_writer(id, write_half, encoder, writer_rx));
    tokio::spawn(run_reader(id, read_half, decoder, reader_ctl_rx, inbound_tx));
}

async fn run_reader(
    id: ConnectionId,
    mut socket: OwnedReadHalf,
    mut decoder: FrameDecoder,
    mut ctl_rx: mpsc::UnboundedReceiver<ReaderControl>,
    inbound_tx: InboundSender,
) {
    let mut state = ConnectionState::Handshake;
    let mut buf = vec![0u8; 8 * 1024];

    let reason = loop {
        tokio::select! {
            // Control first: a state switch queued by the tick thread must
            // land before the bytes it governs are decoded.
            biased;

            ctl = ctl_rx.recv() => match ctl {
                Some(ReaderControl::SetState(next)) => state = next,
                Some(ReaderControl::EnableCompression(threshold)) => {
                    decoder.enable_compression(threshold);
                }
                // Connection removed on the tick thread; stop reading.
                None => return,
            },

            read = socket.read(&mut buf) => {
                let n = match read {
                    Ok(0) => break DisconnectReason::ClientQuit,
                    Ok(n) => n,
                    Err(e) => {
                        trace!("{id}: read error: {e}");
                        break DisconnectReason::ClientQuit;
                    }
                };
                decoder.feed(&buf[..n]);
                match drain_frames(id, &mut decoder, &mut state, &inbound_tx).await {
                    Ok(()) => {}
                    Err(reason) => break reason,
                }
            }
        }
    };

    let _ = inbound_tx.send(InboundEvent::Disconnected { id, reason }).await;
}

/// Decodes every complete frame buffered so far, forwarding packets
/// inbound. Returns the disconnect reason on a protocol violation.
async fn drain_frames(
    id: ConnectionId,
    decoder: &mut FrameDecoder,
    state: &mut ConnectionState,
    inbound_tx: &InboundSender,
) -> Result<(), DisconnectReason> {
    loop {
        let body = match decoder.next_frame() {
            Ok(Some(body)) => body,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("{id}: bad frame in {state}: {e}");
                return Err(DisconnectReason::ProtocolViolation(e.to_string()));
            }
        };
        let packet = match ServerboundPacket::decode(*state, &body) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("{id}: bad packet in {state}: {e}");
                return Err(DisconnectReason::ProtocolViolation(e.to_string()));
            }
        };

        // The frame after a handshake is already in the next state's id
        // space, so the switch cannot wait for the tick thread.
        if let ServerboundPacket::Handshake { next_state, .. } = &packet {
            match ConnectionState::from_handshake_next(*next_state) {
                Some(next) => *state = next,
                None => {
                    return Err(DisconnectReason::ProtocolViolation(format!(
                        "handshake requested unknown state {next_state}"
                    )));
                }
            }
        }

        if inbound_tx
            .send(InboundEvent::Packet { id, packet })
            .await
            .is_err()
        {
            // Tick thread gone; reader has nothing left to do.
            return Err(DisconnectReason::ServerShutdown);
        }
    }
}

async fn run_writer(
    id: ConnectionId,
    mut socket: OwnedWriteHalf,
    mut encoder: FrameEncoder,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Send(packet) => {
                let frame = match encoder.encode(&packet.encode()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("{id}: failed to encode {packet:?}: {e}");
                        continue;
                    }
                };
                if let Err(e) = socket.write_all(&frame).await {
                    trace!("{id}: write error: {e}");
                    break;
                }
            }
            WriterCommand::EnableCompression(threshold) => {
                encoder.enable_compression(threshold);
            }
            WriterCommand::Close => break,
        }
    }
    let _ = socket.shutdown().await;
    debug!("{id}: writer closed");
}
