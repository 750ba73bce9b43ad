//! Core server events dispatched on the tick thread.
//!
//! Every player-driven state transition is proposed as one of these events
//! before it is applied; a cancelled event never reaches the world.

use std::any::Any;

use quarry_events::{CancelState, Cancellation, Event, EventError};

use crate::connection::DisconnectReason;
use crate::types::{BlockPos, PlayerId, Position};

macro_rules! impl_event_base {
    ($tag:literal) => {
        fn type_name(&self) -> &'static str {
            $tag
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    };
}

macro_rules! impl_event_cancel {
    ($tag:literal) => {
        fn cancel_state(&self) -> CancelState {
            self.cancel.state()
        }
        fn try_set_cancelled(&mut self, cancelled: bool) -> Result<(), EventError> {
            self.cancel.set(cancelled, $tag)
        }
        fn restore_cancelled(&mut self, cancelled: bool) {
            self.cancel.restore(cancelled)
        }
    };
}

/// A player completed login and entered Play.
#[derive(Debug)]
pub struct PlayerJoinEvent {
    pub player: PlayerId,
    pub username: String,
    pub spawn: Position,
}

impl Event for PlayerJoinEvent {
    impl_event_base!("player_join");
}

/// A player's connection was torn down. Emitted exactly once per player.
#[derive(Debug)]
pub struct PlayerQuitEvent {
    pub player: PlayerId,
    pub username: String,
    pub reason: DisconnectReason,
}

impl Event for PlayerQuitEvent {
    impl_event_base!("player_quit");
}

/// A chat line, pre-broadcast. Cancelling suppresses the broadcast.
#[derive(Debug)]
pub struct PlayerChatEvent {
    pub player: PlayerId,
    pub username: String,
    pub message: String,
    cancel: Cancellation,
}

impl PlayerChatEvent {
    pub fn new(player: PlayerId, username: String, message: String) -> Self {
        Self {
            player,
            username,
            message,
            cancel: Cancellation::new(),
        }
    }
}

impl Event for PlayerChatEvent {
    impl_event_base!("player_chat");
    impl_event_cancel!("player_chat");
}

/// A proposed movement. Cancelling resets the player to `from`.
///
/// Move events permit un-cancelling, so an anti-cheat listener at `Low` may
/// veto and a teleport plugin at `High` may still override it.
#[derive(Debug)]
pub struct PlayerMoveEvent {
    pub player: PlayerId,
    pub from: Position,
    pub to: Position,
    cancel: Cancellation,
}

impl PlayerMoveEvent {
    pub fn new(player: PlayerId, from: Position, to: Position) -> Self {
        Self {
            player,
            from,
            to,
            cancel: Cancellation::allowing_uncancel(),
        }
    }
}

impl Event for PlayerMoveEvent {
    impl_event_base!("player_move");
    impl_event_cancel!("player_move");
}

/// A proposed block placement. Cancelling leaves the world untouched and
/// sends the client a corrective block update.
#[derive(Debug)]
pub struct BlockPlaceEvent {
    pub player: PlayerId,
    pub position: BlockPos,
    pub block_id: u16,
    cancel: Cancellation,
}

impl BlockPlaceEvent {
    pub fn new(player: PlayerId, position: BlockPos, block_id: u16) -> Self {
        Self {
            player,
            position,
            block_id,
            cancel: Cancellation::new(),
        }
    }
}

impl Event for BlockPlaceEvent {
    impl_event_base!("block_place");
    impl_event_cancel!("block_place");
}

/// A proposed block removal.
#[derive(Debug)]
pub struct BlockBreakEvent {
    pub player: PlayerId,
    pub position: BlockPos,
    cancel: Cancellation,
}

impl BlockBreakEvent {
    pub fn new(player: PlayerId, position: BlockPos) -> Self {
        Self {
            player,
            position,
            cancel: Cancellation::new(),
        }
    }
}

impl Event for BlockBreakEvent {
    impl_event_base!("block_break");
    impl_event_cancel!("block_break");
}

/// Fired at the top of every tick, before inbound processing.
#[derive(Debug)]
pub struct TickStartEvent {
    pub tick: u64,
}

impl Event for TickStartEvent {
    impl_event_base!("tick_start");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_event_permits_uncancel() {
        let mut ev = PlayerMoveEvent::new(
            PlayerId::offline("steve"),
            Position::default(),
            Position::new(1.0, 0.0, 0.0),
        );
        ev.try_set_cancelled(true).unwrap();
        ev.try_set_cancelled(false).unwrap();
        assert_eq!(ev.cancel_state(), CancelState::Cancellable);
    }

    #[test]
    fn chat_cancel_is_one_way() {
        let mut ev = PlayerChatEvent::new(
            PlayerId::offline("steve"),
            "steve".to_string(),
            "hi".to_string(),
        );
        ev.try_set_cancelled(true).unwrap();
        assert!(ev.try_set_cancelled(false).is_err());
    }

    #[test]
    fn tick_start_is_not_cancellable() {
        let mut ev = TickStartEvent { tick: 0 };
        assert_eq!(ev.cancel_state(), CancelState::NotCancellable);
        assert!(ev.try_set_cancelled(true).is_err());
    }
}
