//! A* search over a room's four-connected walkable tiles.
//!
//! Edges cost 1 and the heuristic is manhattan distance. Neighbours are
//! expanded east, south, west, north; among equal-cost frontier entries the
//! deeper one is taken first and remaining ties go to the earliest discovered.
//! Together this makes routes advance horizontally before vertically when
//! several optimal routes exist.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, VecDeque},
    iter::FusedIterator,
};

use serde::{Deserialize, Serialize};

use crate::{Direction, Position, occupancy, room::Room, world::AgentState};

/// Waypoints from the tile after the start up to and including the goal.
///
/// A path is consumed as it is followed and cannot be restarted. An empty
/// path means no route (or that the start already is the goal).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    waypoints: VecDeque<Position>,
}

impl Path {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// The next waypoint without consuming it.
    pub fn peek(&self) -> Option<Position> {
        self.waypoints.front().copied()
    }

    /// The final waypoint, if any.
    pub fn goal(&self) -> Option<Position> {
        self.waypoints.back().copied()
    }

    /// Remaining waypoints in order.
    pub fn remaining(&self) -> impl Iterator<Item = Position> + '_ {
        self.waypoints.iter().copied()
    }
}

impl Iterator for Path {
    type Item = Position;

    fn next(&mut self) -> Option<Position> {
        self.waypoints.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.waypoints.len(), Some(self.waypoints.len()))
    }
}

impl ExactSizeIterator for Path {}

impl FusedIterator for Path {}

/// Finds the shortest route inside `room`, avoiding tiles where an agent of
/// `roster` currently rests.
///
/// Locks are not consulted; a plan is a snapshot and claims are checked when
/// each step is executed.
pub fn find_path(room: &Room, roster: &[AgentState], start: Position, goal: Position) -> Path {
    find_path_with(room, start, goal, |position| {
        occupancy::is_occupied_by_agent(roster, room.id(), position)
    })
}

/// A* with a caller-supplied occupancy predicate on top of terrain walkability.
pub fn find_path_with<F>(room: &Room, start: Position, goal: Position, is_occupied: F) -> Path
where
    F: Fn(Position) -> bool,
{
    if start == goal || !room.contains(start) || !room.is_walkable(goal) || is_occupied(goal) {
        return Path::empty();
    }

    let mut frontier = BinaryHeap::new();
    let mut came_from: HashMap<Position, Position> = HashMap::new();
    let mut cost_so_far: HashMap<Position, usize> = HashMap::new();
    let mut sequence = 0usize;

    frontier.push(Frontier {
        estimate: start.manhattan_distance(goal),
        cost: 0,
        sequence,
        position: start,
    });
    cost_so_far.insert(start, 0);

    while let Some(Frontier {
        cost,
        position: current,
        ..
    }) = frontier.pop()
    {
        if current == goal {
            return reconstruct(&came_from, start, goal);
        }
        // Stale entry superseded by a cheaper one.
        if cost_so_far.get(&current).is_some_and(|best| *best < cost) {
            continue;
        }

        for direction in Direction::ALL {
            let Some(neighbor) = current.step(direction) else {
                continue;
            };
            if !room.is_walkable(neighbor) || is_occupied(neighbor) {
                continue;
            }

            let new_cost = cost + 1;
            if cost_so_far
                .get(&neighbor)
                .is_some_and(|known| *known <= new_cost)
            {
                continue;
            }

            cost_so_far.insert(neighbor, new_cost);
            came_from.insert(neighbor, current);
            sequence += 1;
            frontier.push(Frontier {
                estimate: new_cost + neighbor.manhattan_distance(goal),
                cost: new_cost,
                sequence,
                position: neighbor,
            });
        }
    }

    Path::empty()
}

fn reconstruct(came_from: &HashMap<Position, Position>, start: Position, goal: Position) -> Path {
    let mut waypoints = VecDeque::new();
    let mut current = goal;
    while current != start {
        waypoints.push_front(current);
        match came_from.get(&current) {
            Some(previous) => current = *previous,
            None => return Path::empty(),
        }
    }
    Path { waypoints }
}

/// Frontier entry ordered so that `BinaryHeap` pops the lowest estimate,
/// then the highest cost, then the earliest discovery. Position is the last
/// key so that ordering agrees with equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frontier {
    estimate: usize,
    cost: usize,
    sequence: usize,
    position: Position,
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| self.cost.cmp(&other.cost))
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
