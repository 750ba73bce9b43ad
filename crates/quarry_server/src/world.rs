//! Minimal sandbox world owned by the tick thread.
//!
//! Mutations accepted during inbound processing are queued, then applied in
//! one batch by [`World::step`] during the simulation phase; the returned
//! change list is what the flush phase broadcasts. Block id 0 is air.

use std::collections::HashMap;

use crate::types::{BlockPos, EntityId, PlayerId, Position};

pub const AIR: u16 = 0;

/// Default spawn point for newly bound entities.
pub const SPAWN: Position = Position::new(0.0, 64.0, 0.0);

#[derive(Debug)]
pub struct Entity {
    pub id: EntityId,
    pub player: PlayerId,
    pub position: Position,
}

/// A mutation applied by [`World::step`], to be broadcast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorldChange {
    EntityMoved {
        entity: EntityId,
        position: Position,
    },
    BlockChanged {
        position: BlockPos,
        block_id: u16,
    },
}

#[derive(Debug, Default)]
pub struct World {
    blocks: HashMap<BlockPos, u16>,
    entities: HashMap<EntityId, Entity>,
    by_player: HashMap<PlayerId, EntityId>,
    next_entity: u64,
    pending: Vec<WorldChange>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a fresh entity for `player` at the spawn point.
    pub fn bind_entity(&mut self, player: PlayerId) -> EntityId {
        let id = EntityId(self.next_entity);
        self.next_entity += 1;
        self.entities.insert(
            id,
            Entity {
                id,
                player,
                position: SPAWN,
            },
        );
        self.by_player.insert(player, id);
        id
    }

    /// Releases `player`'s entity, if bound. Idempotent.
    pub fn release_entity(&mut self, player: PlayerId) -> Option<EntityId> {
        let id = self.by_player.remove(&player)?;
        self.entities.remove(&id);
        Some(id)
    }

    pub fn entity_of(&self, player: PlayerId) -> Option<EntityId> {
        self.by_player.get(&player).copied()
    }

    pub fn position_of(&self, player: PlayerId) -> Option<Position> {
        let id = self.by_player.get(&player)?;
        self.entities.get(id).map(|e| e.position)
    }

    pub fn block_at(&self, pos: BlockPos) -> u16 {
        self.blocks.get(&pos).copied().unwrap_or(AIR)
    }

    pub fn player_count(&self) -> usize {
        self.entities.len()
    }

    /// Queues an accepted movement for the next [`step`](World::step).
    pub fn queue_move(&mut self, entity: EntityId, position: Position) {
        self.pending.push(WorldChange::EntityMoved { entity, position });
    }

    /// Queues an accepted block mutation (`AIR` to break) for the next step.
    pub fn queue_block(&mut self, position: BlockPos, block_id: u16) {
        self.pending.push(WorldChange::BlockChanged { position, block_id });
    }

    /// Applies every queued mutation in acceptance order and returns the
    /// changes that actually took effect.
    pub fn step(&mut self) -> Vec<WorldChange> {
        let pending = std::mem::take(&mut self.pending);
        let mut applied = Vec::with_capacity(pending.len());
        for change in pending {
            match change {
                WorldChange::EntityMoved { entity, position } => {
                    // The entity may have been released since acceptance.
                    if let Some(e) = self.entities.get_mut(&entity) {
                        e.position = position;
                        applied.push(change);
                    }
                }
                WorldChange::BlockChanged { position, block_id } => {
                    if block_id == AIR {
                        self.blocks.remove(&position);
                    } else {
                        self.blocks.insert(position, block_id);
                    }
                    applied.push(change);
                }
            }
        }
        applied
    }
}
