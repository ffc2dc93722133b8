use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    Direction, EntityId, Position, RoomId,
    controller::{AgentView, Controller, Intent},
    occupancy::{self, LockTable},
    pathfinder::{self, Path},
    room::{ConfigError, Room, Transition},
};

/// Whether an agent is the player or a non-player character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentKind {
    Player,
    Npc,
}

/// Holds the navigation state of an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub id: EntityId,
    pub kind: AgentKind,
    pub room: RoomId,
    pub position: Position,
    pub facing: Direction,
    /// Waypoints not yet reached.
    pub path: Path,
    /// Tile this agent has claimed for its next step.
    pub held_lock: Option<Position>,
    /// Standing on a transition whose destination was not free yet.
    pub pending_handoff: bool,
}

/// Represents what happened to one agent during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Idle,
    Stepped {
        from: Position,
        to: Position,
    },
    /// The next waypoint could not be claimed; the path is kept.
    Blocked {
        at: Position,
    },
    /// A travel intent found no route; the agent stays put.
    NoRoute {
        target: Position,
    },
    /// The final waypoint was reached.
    Arrived {
        at: Position,
    },
    Transitioned {
        from_room: RoomId,
        to_room: RoomId,
        at: Position,
        facing: Direction,
    },
    /// The destination tile of a transition is taken; retried next tick.
    HandOffDeferred {
        to_room: RoomId,
        at: Position,
    },
}

/// Outcome of every agent for one tick, in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub outcomes: Vec<(EntityId, StepOutcome)>,
}

impl TickReport {
    pub fn outcome(&self, agent: EntityId) -> Option<StepOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| *id == agent)
            .map(|(_, outcome)| *outcome)
    }
}

/// Owns the rooms, their lock tables and the agent roster.
///
/// This is the single writer of lock tables and agent positions; controllers
/// only see read-only [`AgentView`]s.
#[derive(Default)]
pub struct World {
    rooms: BTreeMap<RoomId, Room>,
    locks: BTreeMap<RoomId, LockTable>,
    agents: Vec<AgentState>,
    controllers: HashMap<EntityId, Box<dyn Controller>>,
    next_entity_id: EntityId,
    tick: u64,
}

impl World {
    /// Creates a new, empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a room. Its transitions are checked by [`World::validate`]
    /// once every room is present.
    pub fn add_room(&mut self, room: Room) -> Result<RoomId, ConfigError> {
        let id = room.id();
        if self.rooms.contains_key(&id) {
            return Err(ConfigError::DuplicateRoom(id));
        }
        if room.is_incident_room() {
            if let Some(existing) = self.incident_room() {
                warn!("[World] {} and {} both claim the incident room", existing, id);
                return Err(ConfigError::IncidentRoomConflict {
                    existing,
                    room: id,
                });
            }
        }
        self.locks.insert(id, LockTable::for_room(&room));
        self.rooms.insert(id, room);
        Ok(id)
    }

    /// Declares a transition out of `room` after checking both endpoints.
    pub fn add_transition(
        &mut self,
        room: RoomId,
        transition: Transition,
    ) -> Result<(), ConfigError> {
        self.check_destination(&transition)?;
        self.rooms
            .get_mut(&room)
            .ok_or(ConfigError::UnknownRoom(room))?
            .add_transition(transition)
    }

    fn check_destination(&self, transition: &Transition) -> Result<(), ConfigError> {
        let destination = self
            .rooms
            .get(&transition.to_room)
            .ok_or(ConfigError::UnknownRoom(transition.to_room))?;
        if !destination.contains(transition.to) {
            return Err(ConfigError::OutOfBounds {
                room: transition.to_room,
                position: transition.to,
            });
        }
        if !destination.is_walkable(transition.to) {
            return Err(ConfigError::InvalidPlacement {
                room: transition.to_room,
                position: transition.to,
                reason: "transition destination is not walkable",
            });
        }
        Ok(())
    }

    /// Checks every declared transition against the registered rooms.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for room in self.rooms.values() {
            for transition in room.transitions() {
                self.check_destination(transition)?;
            }
        }
        Ok(())
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn locks(&self, id: RoomId) -> Option<&LockTable> {
        self.locks.get(&id)
    }

    pub fn incident_room(&self) -> Option<RoomId> {
        self.rooms
            .values()
            .find(|room| room.is_incident_room())
            .map(Room::id)
    }

    /// Makes `id` the incident room and clears the flag everywhere else.
    pub fn designate_incident_room(&mut self, id: RoomId) -> Result<(), ConfigError> {
        if !self.rooms.contains_key(&id) {
            return Err(ConfigError::UnknownRoom(id));
        }
        for room in self.rooms.values_mut() {
            room.set_incident_room(room.id() == id);
        }
        info!("[World] {} is the incident room", id);
        Ok(())
    }

    /// Enables the concealed-passage triggers of `id`, e.g. after the puzzle is solved.
    pub fn open_concealed_passage(&mut self, id: RoomId) -> Result<(), ConfigError> {
        let room = self
            .rooms
            .get_mut(&id)
            .ok_or(ConfigError::UnknownRoom(id))?;
        room.open_concealed_passage();
        info!("[World] Concealed passage opened in {}", id);
        Ok(())
    }

    /// Generates a unique entity ID for agents.
    pub fn reserve_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    /// Adds an agent driven by `behavior`. The agent's ID is the controller's ID.
    pub fn add_agent(
        &mut self,
        kind: AgentKind,
        room: RoomId,
        position: Position,
        behavior: Box<dyn Controller>,
    ) -> Result<EntityId, ConfigError> {
        let id = behavior.id();
        self.place_agent(id, kind, room, position)?;
        self.controllers.insert(id, behavior);
        Ok(id)
    }

    /// Adds an agent with no controller; it only moves via [`World::set_target`].
    pub fn spawn(
        &mut self,
        kind: AgentKind,
        room: RoomId,
        position: Position,
    ) -> Result<EntityId, ConfigError> {
        let id = self.reserve_entity_id();
        self.place_agent(id, kind, room, position)?;
        Ok(id)
    }

    fn place_agent(
        &mut self,
        id: EntityId,
        kind: AgentKind,
        room: RoomId,
        position: Position,
    ) -> Result<(), ConfigError> {
        let target = self.rooms.get(&room).ok_or(ConfigError::UnknownRoom(room))?;
        if !target.contains(position) {
            return Err(ConfigError::OutOfBounds { room, position });
        }
        if !target.is_walkable(position) {
            return Err(ConfigError::InvalidPlacement {
                room,
                position,
                reason: "tile is not walkable",
            });
        }
        if occupancy::is_occupied_by_agent(&self.agents, room, position) {
            return Err(ConfigError::InvalidPlacement {
                room,
                position,
                reason: "tile is occupied by another agent",
            });
        }
        if self.agent(id).is_some() {
            return Err(ConfigError::DuplicateAgent(id));
        }

        self.agents.push(AgentState {
            id,
            kind,
            room,
            position,
            facing: Direction::South,
            path: Path::empty(),
            held_lock: None,
            pending_handoff: false,
        });
        self.next_entity_id = self.next_entity_id.max(id + 1);
        debug!("[World] Agent {} ({:?}) placed at {} in {}", id, kind, position, room);
        Ok(())
    }

    /// Removes an agent, releasing any claim it holds.
    pub fn remove_agent(&mut self, id: EntityId) -> Option<AgentState> {
        let index = self.agent_index(id)?;
        let agent = self.agents.remove(index);
        if let Some(locks) = self.locks.get_mut(&agent.room) {
            locks.release_all(id);
        }
        self.controllers.remove(&id);
        Some(agent)
    }

    /// Agents in registration order.
    pub fn agents(&self) -> &[AgentState] {
        &self.agents
    }

    pub fn agent(&self, id: EntityId) -> Option<&AgentState> {
        self.agents.iter().find(|agent| agent.id == id)
    }

    fn agent_index(&self, id: EntityId) -> Option<usize> {
        self.agents.iter().position(|agent| agent.id == id)
    }

    pub fn player(&self) -> Option<&AgentState> {
        self.agents
            .iter()
            .find(|agent| agent.kind == AgentKind::Player)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Terrain walkability; unknown rooms are never walkable.
    pub fn is_walkable(&self, room: RoomId, position: Position) -> bool {
        self.rooms
            .get(&room)
            .is_some_and(|room| room.is_walkable(position))
    }

    pub fn is_trigger(&self, room: RoomId, position: Position) -> bool {
        self.rooms
            .get(&room)
            .is_some_and(|room| room.is_trigger(position))
    }

    pub fn facing_at(&self, room: RoomId, position: Position) -> Option<Direction> {
        self.rooms.get(&room)?.facing_at(position)
    }

    pub fn hiding_spots(&self, room: RoomId) -> Option<&BTreeSet<Position>> {
        self.rooms.get(&room).map(Room::hiding_spots)
    }

    pub fn transition_at(&self, room: RoomId, position: Position) -> Option<Transition> {
        self.rooms.get(&room)?.transition_at(position).copied()
    }

    /// The transition at `position` if its tile currently triggers.
    ///
    /// A transition behind a closed concealed passage stays inert.
    fn active_transition(&self, room: RoomId, position: Position) -> Option<Transition> {
        let room = self.rooms.get(&room)?;
        if !room.is_trigger(position) {
            return None;
        }
        room.transition_at(position).copied()
    }

    /// Claims `position` in `room` for `claimant`. See [`LockTable::lock`].
    pub fn lock(&mut self, room: RoomId, position: Position, claimant: EntityId) -> bool {
        self.locks
            .get_mut(&room)
            .is_some_and(|locks| locks.lock(position, claimant))
    }

    pub fn unlock(&mut self, room: RoomId, position: Position) {
        if let Some(locks) = self.locks.get_mut(&room) {
            locks.unlock(position);
        }
    }

    pub fn is_occupied_by_agent(&self, room: RoomId, position: Position) -> bool {
        occupancy::is_occupied_by_agent(&self.agents, room, position)
    }

    /// Whether `mover` may step onto `position` in `room` right now.
    pub fn is_safe_step(&self, room: RoomId, mover: EntityId, position: Position) -> bool {
        match (self.rooms.get(&room), self.locks.get(&room)) {
            (Some(room), Some(locks)) => {
                occupancy::is_safe_step(room, locks, &self.agents, mover, position)
            }
            _ => false,
        }
    }

    /// Plans a route in `room` around the current resting positions.
    pub fn find_path(&self, room: RoomId, start: Position, goal: Position) -> Path {
        match self.rooms.get(&room) {
            Some(room) => pathfinder::find_path(room, &self.agents, start, goal),
            None => Path::empty(),
        }
    }

    /// A random free, non-trigger tile of `room`.
    pub fn random_location<R: Rng + ?Sized>(&self, room: RoomId, rng: &mut R) -> Option<Position> {
        let (room, locks) = (self.rooms.get(&room)?, self.locks.get(&room)?);
        occupancy::random_free_tile(room, locks, &self.agents, rng)
    }

    /// Replaces the agent's path with a fresh route to `target`.
    ///
    /// Returns `false` when the agent is unknown or no route exists; the agent
    /// then stays idle.
    pub fn set_target(&mut self, id: EntityId, target: Position) -> bool {
        let Some(index) = self.agent_index(id) else {
            return false;
        };
        self.travel(index, target)
    }

    /// Abandons the agent's path and releases its claim.
    pub fn cancel_path(&mut self, id: EntityId) {
        if let Some(index) = self.agent_index(id) {
            self.stop(index);
        }
    }

    fn release_claim(&mut self, index: usize) {
        let agent = &mut self.agents[index];
        if let Some(claimed) = agent.held_lock.take() {
            if let Some(locks) = self.locks.get_mut(&agent.room) {
                locks.unlock(claimed);
            }
        }
    }

    fn stop(&mut self, index: usize) {
        self.release_claim(index);
        let agent = &mut self.agents[index];
        agent.path = Path::empty();
        agent.pending_handoff = false;
    }

    fn travel(&mut self, index: usize, target: Position) -> bool {
        self.stop(index);
        let agent = &self.agents[index];
        let path = self.find_path(agent.room, agent.position, target);
        let found = !path.is_empty();
        if !found && agent.position != target {
            debug!("[World] Agent {} has no route to {}", agent.id, target);
        }

        self.agents[index].path = path;
        found
    }

    /// Moves the agent through the transition it stands on, if any.
    pub fn hand_off(&mut self, id: EntityId) -> Option<StepOutcome> {
        let index = self.agent_index(id)?;
        self.try_hand_off(index, &[])
    }

    /// Hands the agent over if its destination is free, otherwise marks the
    /// hand-off as deferred. `earlier` lists where agents rested when the
    /// current tick began; those tiles stay taken until the tick ends.
    fn try_hand_off(
        &mut self,
        index: usize,
        earlier: &[(EntityId, RoomId, Position)],
    ) -> Option<StepOutcome> {
        let agent = &self.agents[index];
        let Some(transition) = self.active_transition(agent.room, agent.position) else {
            self.agents[index].pending_handoff = false;
            return None;
        };

        let vacated_this_tick = earlier.iter().any(|&(other, room, position)| {
            other != agent.id && room == transition.to_room && position == transition.to
        });
        let destination_taken = vacated_this_tick
            || occupancy::resting_agent(&self.agents, transition.to_room, transition.to)
                .is_some_and(|other| other != agent.id)
            || self
                .locks
                .get(&transition.to_room)
                .is_none_or(|locks| locks.is_locked_by_other(transition.to, agent.id));

        if destination_taken {
            debug!(
                "[World] Agent {} waits for {} in {}",
                agent.id, transition.to, transition.to_room
            );
            self.agents[index].pending_handoff = true;
            return Some(StepOutcome::HandOffDeferred {
                to_room: transition.to_room,
                at: transition.to,
            });
        }

        self.stop(index);
        let agent = &mut self.agents[index];
        let from_room = agent.room;
        agent.room = transition.to_room;
        agent.position = transition.to;
        agent.facing = transition.facing;
        agent.pending_handoff = false;
        info!(
            "[World] Agent {} moved from {} to {} at {} facing {:?}",
            agent.id, from_room, transition.to_room, transition.to, transition.facing
        );
        Some(StepOutcome::Transitioned {
            from_room,
            to_room: transition.to_room,
            at: transition.to,
            facing: transition.facing,
        })
    }

    /// Advances every agent by at most one tile.
    ///
    /// All agents claim their next tile before anyone moves, so a tile
    /// vacated this tick only becomes available on the next one. Hand-offs
    /// follow the same rule.
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let mut outcomes: Vec<Option<StepOutcome>> = vec![None; self.agents.len()];
        let resting: Vec<(EntityId, RoomId, Position)> = self
            .agents
            .iter()
            .map(|agent| (agent.id, agent.room, agent.position))
            .collect();

        // Intents and claims.
        for index in 0..self.agents.len() {
            let id = self.agents[index].id;
            let intent = match self.controllers.get_mut(&id) {
                Some(behavior) => {
                    let agent = &self.agents[index];
                    match (self.rooms.get(&agent.room), self.locks.get(&agent.room)) {
                        (Some(room), Some(locks)) => behavior.intent(&AgentView {
                            agent,
                            room,
                            locks,
                            roster: &self.agents,
                        }),
                        _ => Intent::Continue,
                    }
                }
                None => Intent::Continue,
            };

            match intent {
                Intent::Continue => {}
                Intent::Stop => self.stop(index),
                Intent::Travel(target) => {
                    let at_target = self.agents[index].position == target;
                    if !self.travel(index, target) && !at_target {
                        outcomes[index] = Some(StepOutcome::NoRoute { target });
                        continue;
                    }
                }
            }

            if self.agents[index].pending_handoff {
                continue;
            }
            outcomes[index] = self.claim_next(index);
        }

        // Commit claimed steps.
        for index in 0..self.agents.len() {
            if let Some(outcome) = self.commit_step(index) {
                outcomes[index] = Some(outcome);
            }
        }

        // Hand-offs, including ones deferred from earlier ticks.
        for index in 0..self.agents.len() {
            if self.agents[index].pending_handoff {
                if let Some(outcome) = self.try_hand_off(index, &resting) {
                    outcomes[index] = Some(outcome);
                }
            }
        }

        TickReport {
            tick: self.tick,
            outcomes: self
                .agents
                .iter()
                .zip(outcomes)
                .map(|(agent, outcome)| (agent.id, outcome.unwrap_or(StepOutcome::Idle)))
                .collect(),
        }
    }

    /// Tries to lock the next waypoint. Returns an outcome only when the
    /// agent will not move this tick.
    fn claim_next(&mut self, index: usize) -> Option<StepOutcome> {
        let agent = &self.agents[index];
        let next = agent.path.peek()?;

        if agent.position.manhattan_distance(next) != 1 {
            debug!(
                "[World] Agent {} dropped a path that does not start next to {}",
                agent.id, agent.position
            );
            self.stop(index);
            return None;
        }

        let (id, room) = (agent.id, agent.room);
        let safe = self.is_safe_step(room, id, next);
        let claimed = safe
            && self.locks.get_mut(&room).is_some_and(|locks| {
                locks.holder(next) == Some(id) || locks.lock(next, id)
            });

        if claimed {
            self.agents[index].held_lock = Some(next);
            None
        } else {
            debug!("[World] Agent {} blocked at {}", id, next);
            Some(StepOutcome::Blocked { at: next })
        }
    }

    fn commit_step(&mut self, index: usize) -> Option<StepOutcome> {
        let agent = &mut self.agents[index];
        let to = agent.held_lock.take()?;
        let from = agent.position;

        agent.path.next();
        agent.position = to;
        if let Some(direction) = from.direction_to(to) {
            agent.facing = direction;
        }
        if let Some(locks) = self.locks.get_mut(&agent.room) {
            locks.unlock(to);
        }

        let on_transition = self
            .rooms
            .get(&agent.room)
            .is_some_and(|room| room.is_trigger(to) && room.transition_at(to).is_some());
        if on_transition {
            agent.pending_handoff = true;
        }

        if agent.path.is_empty() {
            Some(StepOutcome::Arrived { at: to })
        } else {
            Some(StepOutcome::Stepped { from, to })
        }
    }
}
