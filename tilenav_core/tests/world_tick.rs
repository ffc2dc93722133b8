mod common;

use std::collections::HashSet;

use common::{open_room, p, room};
use tilenav_core::{
    Direction, RoomId,
    controller::{AgentView, Controller, Intent, Scripted, Wanderer},
    room::ConfigError,
    world::{AgentKind, StepOutcome, World},
};

const HALL: RoomId = RoomId(0);

#[test]
fn agents_walk_their_path_one_tile_per_tick() {
    let mut world = World::new();
    world.add_room(open_room(0, 3)).unwrap();
    let id = world.spawn(AgentKind::Player, HALL, p(0, 0)).unwrap();
    assert!(world.set_target(id, p(2, 1)));

    let outcomes: Vec<_> = (0..4).map(|_| world.tick().outcome(id).unwrap()).collect();
    assert_eq!(
        outcomes,
        vec![
            StepOutcome::Stepped {
                from: p(0, 0),
                to: p(1, 0)
            },
            StepOutcome::Stepped {
                from: p(1, 0),
                to: p(2, 0)
            },
            StepOutcome::Arrived { at: p(2, 1) },
            StepOutcome::Idle,
        ]
    );
    let state = world.agent(id).unwrap();
    assert_eq!(state.facing, Direction::South);
    assert_eq!(world.locks(HALL).unwrap().locked_count(), 0);
}

#[test]
fn earlier_registered_agent_wins_a_contested_tile() {
    let mut world = World::new();
    world.add_room(room(0, &["..."])).unwrap();
    let west = world.spawn(AgentKind::Npc, HALL, p(0, 0)).unwrap();
    let east = world.spawn(AgentKind::Npc, HALL, p(2, 0)).unwrap();

    world.set_target(west, p(1, 0));
    world.set_target(east, p(1, 0));
    let report = world.tick();

    assert_eq!(report.outcome(west), Some(StepOutcome::Arrived { at: p(1, 0) }));
    assert_eq!(report.outcome(east), Some(StepOutcome::Blocked { at: p(1, 0) }));
    assert_eq!(world.agent(east).unwrap().position, p(2, 0));
    assert_eq!(world.agent(east).unwrap().path.peek(), Some(p(1, 0)));
}

#[test]
fn a_vacated_tile_is_not_reused_in_the_same_tick() {
    let mut world = World::new();
    world.add_room(room(0, &["....", "#.##"])).unwrap();
    let leader = world.spawn(AgentKind::Npc, HALL, p(1, 1)).unwrap();
    let follower = world.spawn(AgentKind::Npc, HALL, p(0, 0)).unwrap();

    assert!(world.set_target(follower, p(2, 0)));
    assert!(world.set_target(leader, p(1, 0)));
    let report = world.tick();
    assert_eq!(report.outcome(leader), Some(StepOutcome::Arrived { at: p(1, 0) }));
    assert_eq!(report.outcome(follower), Some(StepOutcome::Blocked { at: p(1, 0) }));

    // The leader moves on first; its old tile stays taken until the next tick.
    assert!(world.set_target(leader, p(3, 0)));
    let report = world.tick();
    assert_eq!(
        report.outcome(leader),
        Some(StepOutcome::Stepped {
            from: p(1, 0),
            to: p(2, 0)
        })
    );
    assert_eq!(report.outcome(follower), Some(StepOutcome::Blocked { at: p(1, 0) }));

    let report = world.tick();
    assert_eq!(
        report.outcome(follower),
        Some(StepOutcome::Stepped {
            from: p(0, 0),
            to: p(1, 0)
        })
    );
}

#[test]
fn agents_never_swap_tiles() {
    let mut world = World::new();
    world.add_room(room(0, &[".."])).unwrap();
    let a = world.spawn(AgentKind::Npc, HALL, p(0, 0)).unwrap();
    let b = world.spawn(AgentKind::Npc, HALL, p(1, 0)).unwrap();

    // Both goals are occupied at planning time, so no route exists.
    assert!(!world.set_target(a, p(1, 0)));
    assert!(!world.set_target(b, p(0, 0)));
    world.tick();
    assert_eq!(world.agent(a).unwrap().position, p(0, 0));
    assert_eq!(world.agent(b).unwrap().position, p(1, 0));
}

#[test]
fn cancel_path_stops_the_agent() {
    let mut world = World::new();
    world.add_room(open_room(0, 4)).unwrap();
    let id = world.spawn(AgentKind::Player, HALL, p(0, 0)).unwrap();
    world.set_target(id, p(3, 0));
    world.tick();

    world.cancel_path(id);
    assert!(world.agent(id).unwrap().path.is_empty());
    assert_eq!(world.tick().outcome(id), Some(StepOutcome::Idle));
    assert_eq!(world.agent(id).unwrap().position, p(1, 0));
}

#[test]
fn plans_are_not_refreshed_when_blocked() {
    let mut world = World::new();
    world.add_room(open_room(0, 3)).unwrap();
    let walker = world.spawn(AgentKind::Npc, HALL, p(0, 0)).unwrap();
    world.set_target(walker, p(2, 0));
    let blocker = world.spawn(AgentKind::Npc, HALL, p(1, 0)).unwrap();

    for _ in 0..3 {
        assert_eq!(
            world.tick().outcome(walker),
            Some(StepOutcome::Blocked { at: p(1, 0) })
        );
    }

    // A fresh request routes around the blocker.
    assert!(world.set_target(walker, p(2, 0)));
    assert_eq!(world.agent(walker).unwrap().path.len(), 4);
    assert_eq!(world.agent(blocker).unwrap().position, p(1, 0));
}

struct Seeker {
    id: usize,
    target: (usize, usize),
    asked: bool,
}

impl Controller for Seeker {
    fn id(&self) -> usize {
        self.id
    }

    fn intent(&mut self, _view: &AgentView) -> Intent {
        if self.asked {
            return Intent::Continue;
        }
        self.asked = true;
        Intent::Travel(p(self.target.0, self.target.1))
    }
}

#[test]
fn unreachable_travel_intent_reports_no_route() {
    let mut world = World::new();
    world.add_room(room(0, &["..#."])).unwrap();
    let id = world
        .add_agent(
            AgentKind::Npc,
            HALL,
            p(0, 0),
            Box::new(Seeker {
                id: 4,
                target: (3, 0),
                asked: false,
            }),
        )
        .unwrap();
    assert_eq!(id, 4);

    assert_eq!(
        world.tick().outcome(id),
        Some(StepOutcome::NoRoute { target: p(3, 0) })
    );
    assert_eq!(world.tick().outcome(id), Some(StepOutcome::Idle));
}

#[test]
fn scripted_controller_visits_targets_in_order() {
    let mut world = World::new();
    world.add_room(open_room(0, 3)).unwrap();
    let mut script = Scripted::new(0, [p(2, 0), p(2, 2)]);
    script.push(p(0, 2));
    assert_eq!(script.remaining(), 3);
    let id = world
        .add_agent(AgentKind::Player, HALL, p(0, 0), Box::new(script))
        .unwrap();

    let mut arrivals = Vec::new();
    for _ in 0..12 {
        if let Some(StepOutcome::Arrived { at }) = world.tick().outcome(id) {
            arrivals.push(at);
        }
    }
    assert_eq!(arrivals, vec![p(2, 0), p(2, 2), p(0, 2)]);
}

#[test]
fn wanderers_never_share_a_tile_or_leave_the_floor() {
    let mut world = World::new();
    world
        .add_room(room(
            0,
            &[
                "......", //
                ".##...", //
                "...H..", //
                "......",
            ],
        ))
        .unwrap();

    let starts = [p(0, 0), p(5, 0), p(0, 3), p(5, 3), p(2, 2)];
    for (seed, start) in starts.into_iter().enumerate() {
        let id = world.reserve_entity_id();
        let npc = Wanderer::new(id, seed as u64).with_rest_chance(0.2);
        world
            .add_agent(AgentKind::Npc, HALL, start, Box::new(npc))
            .unwrap();
    }

    let mut moved = false;
    for _ in 0..200 {
        let report = world.tick();
        moved |= report
            .outcomes
            .iter()
            .any(|(_, outcome)| matches!(outcome, StepOutcome::Stepped { .. } | StepOutcome::Arrived { .. }));

        let mut seen = HashSet::new();
        for agent in world.agents() {
            assert!(seen.insert(agent.position), "two agents on {}", agent.position);
            assert!(world.is_walkable(HALL, agent.position));
        }
        assert_eq!(world.locks(HALL).unwrap().locked_count(), 0);
    }
    assert!(moved);
}

#[test]
fn placement_is_validated() {
    let mut world = World::new();
    world.add_room(room(0, &[".#."])).unwrap();
    world.spawn(AgentKind::Player, HALL, p(0, 0)).unwrap();

    assert!(matches!(
        world.spawn(AgentKind::Npc, HALL, p(1, 0)),
        Err(ConfigError::InvalidPlacement { .. })
    ));
    assert!(matches!(
        world.spawn(AgentKind::Npc, HALL, p(0, 0)),
        Err(ConfigError::InvalidPlacement { .. })
    ));
    assert_eq!(
        world.spawn(AgentKind::Npc, RoomId(3), p(0, 0)),
        Err(ConfigError::UnknownRoom(RoomId(3)))
    );
    assert!(matches!(
        world.add_agent(AgentKind::Npc, HALL, p(2, 0), Box::new(Scripted::new(0, [p(2, 0)]))),
        Err(ConfigError::DuplicateAgent(0))
    ));
}

#[test]
fn removing_an_agent_frees_its_tile() {
    let mut world = World::new();
    world.add_room(open_room(0, 2)).unwrap();
    let id = world.spawn(AgentKind::Npc, HALL, p(1, 1)).unwrap();
    assert!(world.is_occupied_by_agent(HALL, p(1, 1)));

    let removed = world.remove_agent(id).unwrap();
    assert_eq!(removed.position, p(1, 1));
    assert!(!world.is_occupied_by_agent(HALL, p(1, 1)));
    assert!(world.remove_agent(id).is_none());
}

struct Halter {
    id: usize,
}

impl Controller for Halter {
    fn id(&self) -> usize {
        self.id
    }

    fn intent(&mut self, view: &AgentView) -> Intent {
        if view.agent.position.x >= 1 {
            Intent::Stop
        } else {
            Intent::Continue
        }
    }
}

#[test]
fn stop_intent_drops_the_path() {
    let mut world = World::new();
    world.add_room(open_room(0, 4)).unwrap();
    let id = world
        .add_agent(AgentKind::Npc, HALL, p(0, 0), Box::new(Halter { id: 0 }))
        .unwrap();
    assert!(world.set_target(id, p(3, 0)));

    world.tick();
    assert_eq!(world.tick().outcome(id), Some(StepOutcome::Idle));
    let state = world.agent(id).unwrap();
    assert_eq!(state.position, p(1, 0));
    assert!(state.path.is_empty());
}
