use std::collections::VecDeque;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    EntityId, Position,
    occupancy::{self, LockTable},
    room::Room,
    world::AgentState,
};

/// What a controller wants its agent to do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Keep following the current path, if any.
    Continue,
    /// Drop the current path and plan a new one to this tile.
    Travel(Position),
    /// Drop the current path and stay put.
    Stop,
}

/// Trait for the decision logic feeding the engine.
///
/// Controllers decide *where* an agent should go; the world decides how it
/// gets there and whether each step is currently allowed.
pub trait Controller {
    /// Returns the unique ID of the agent this controller drives.
    fn id(&self) -> EntityId;

    /// Picks the intent for this tick from a read-only view of the agent's room.
    fn intent(&mut self, view: &AgentView) -> Intent;
}

/// Provides a read-only view of the world relevant to one agent.
#[derive(Debug)]
pub struct AgentView<'a> {
    pub agent: &'a AgentState,
    pub room: &'a Room,
    pub locks: &'a LockTable,
    pub roster: &'a [AgentState],
}

impl AgentView<'_> {
    /// True when the agent has nothing left to walk and no hand-off pending.
    pub fn is_idle(&self) -> bool {
        self.agent.path.is_empty() && !self.agent.pending_handoff
    }

    /// A random walkable, non-trigger tile nobody stands on or has claimed.
    pub fn random_free_tile<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Position> {
        occupancy::random_free_tile(self.room, self.locks, self.roster, rng)
    }
}

/// An NPC that roams its current room, heading to random free tiles.
#[derive(Debug)]
pub struct Wanderer {
    id: EntityId,
    rng: StdRng,
    rest_chance: f64,
}

impl Wanderer {
    pub fn new(id: EntityId, seed: u64) -> Self {
        Self {
            id,
            rng: StdRng::seed_from_u64(seed),
            rest_chance: 0.75,
        }
    }

    /// Probability of staying idle for a tick instead of picking a new destination.
    pub fn with_rest_chance(mut self, rest_chance: f64) -> Self {
        self.rest_chance = rest_chance.clamp(0.0, 1.0);
        self
    }
}

impl Controller for Wanderer {
    fn id(&self) -> EntityId {
        self.id
    }

    fn intent(&mut self, view: &AgentView) -> Intent {
        if !view.is_idle() || self.rng.random_bool(self.rest_chance) {
            return Intent::Continue;
        }
        match view.random_free_tile(&mut self.rng) {
            Some(target) => Intent::Travel(target),
            None => Intent::Continue,
        }
    }
}

/// Travels to a fixed list of targets in order, one after the other.
#[derive(Debug, Clone)]
pub struct Scripted {
    id: EntityId,
    targets: VecDeque<Position>,
}

impl Scripted {
    pub fn new(id: EntityId, targets: impl IntoIterator<Item = Position>) -> Self {
        Self {
            id,
            targets: targets.into_iter().collect(),
        }
    }

    pub fn push(&mut self, target: Position) {
        self.targets.push_back(target);
    }

    pub fn remaining(&self) -> usize {
        self.targets.len()
    }
}

impl Controller for Scripted {
    fn id(&self) -> EntityId {
        self.id
    }

    fn intent(&mut self, view: &AgentView) -> Intent {
        if !view.is_idle() {
            return Intent::Continue;
        }
        match self.targets.pop_front() {
            Some(target) => Intent::Travel(target),
            None => Intent::Continue,
        }
    }
}
