//! Tile claims and resting occupancy.
//!
//! Two separate notions keep agents apart:
//!
//! * a *lock* is a transient claim on a tile an agent is about to step onto,
//!   held in a per-room [`LockTable`];
//! * *resting occupancy* is the tile an agent currently stands on, derived from
//!   the roster passed in by the caller. It needs no lock.
//!
//! The roster is always an explicit parameter. An empty roster is a valid
//! input and simply means nothing is resting anywhere.

use rand::{Rng, seq::IteratorRandom};
use serde::{Deserialize, Serialize};

use crate::{EntityId, Position, RoomId, map::Grid, room::Room, world::AgentState};

/// Per-room table of exclusive tile claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockTable {
    room: RoomId,
    claims: Grid<Option<EntityId>>,
}

impl LockTable {
    /// Creates an empty table sized to `room`.
    pub fn for_room(room: &Room) -> Self {
        LockTable {
            room: room.id(),
            claims: Grid::new(room.width(), room.height()),
        }
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    /// Claims `position` for `claimant`.
    ///
    /// Succeeds only if the tile is inside the room and currently unclaimed.
    /// A failed claim leaves the table untouched.
    pub fn lock(&mut self, position: Position, claimant: EntityId) -> bool {
        let Some(slot) = self.claims.get_mut(position) else {
            return false;
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(claimant);
        true
    }

    /// Releases whatever claim exists on `position`. Unlocking a free or
    /// out-of-bounds tile is a no-op.
    pub fn unlock(&mut self, position: Position) {
        if let Some(slot) = self.claims.get_mut(position) {
            *slot = None;
        }
    }

    /// The agent holding a claim on `position`, if any.
    pub fn holder(&self, position: Position) -> Option<EntityId> {
        self.claims.get(position).copied().flatten()
    }

    pub fn is_locked(&self, position: Position) -> bool {
        self.holder(position).is_some()
    }

    /// Whether `position` is claimed by someone other than `claimant`.
    pub fn is_locked_by_other(&self, position: Position, claimant: EntityId) -> bool {
        self.holder(position).is_some_and(|holder| holder != claimant)
    }

    /// Drops every claim held by `claimant` in this room.
    pub fn release_all(&mut self, claimant: EntityId) {
        for slot in self.claims.iter_mut() {
            if *slot == Some(claimant) {
                *slot = None;
            }
        }
    }

    /// Number of tiles currently claimed.
    pub fn locked_count(&self) -> usize {
        self.claims.iter().filter(|slot| slot.is_some()).count()
    }
}

/// The agent standing on `position` in `room`, if any.
pub fn resting_agent(roster: &[AgentState], room: RoomId, position: Position) -> Option<EntityId> {
    roster
        .iter()
        .find(|agent| agent.room == room && agent.position == position)
        .map(|agent| agent.id)
}

/// Whether any tracked agent is standing on `position` in `room`.
pub fn is_occupied_by_agent(roster: &[AgentState], room: RoomId, position: Position) -> bool {
    resting_agent(roster, room, position).is_some()
}

/// Whether `mover` may step onto `position` right now.
///
/// The tile must be walkable terrain, not the resting tile of another agent
/// and not claimed by another agent.
pub fn is_safe_step(
    room: &Room,
    locks: &LockTable,
    roster: &[AgentState],
    mover: EntityId,
    position: Position,
) -> bool {
    if !room.is_walkable(position) {
        return false;
    }
    if resting_agent(roster, room.id(), position).is_some_and(|id| id != mover) {
        return false;
    }
    !locks.is_locked_by_other(position, mover)
}

/// A uniformly chosen tile of `room` that is walkable, not a trigger, not
/// rested on and not claimed. `None` if no such tile exists.
pub fn random_free_tile<R: Rng + ?Sized>(
    room: &Room,
    locks: &LockTable,
    roster: &[AgentState],
    rng: &mut R,
) -> Option<Position> {
    room.walkable_tiles()
        .filter(|position| {
            !room.is_trigger(*position)
                && !locks.is_locked(*position)
                && !is_occupied_by_agent(roster, room.id(), *position)
        })
        .choose(rng)
}
