mod common;

use common::{p, room, room_builder};
use tilenav_core::{
    Direction, RoomId,
    controller::{AgentView, Controller, Intent},
    room::{ConfigError, Transition},
    world::{AgentKind, StepOutcome, World},
};

const HALL: RoomId = RoomId(0);
const PARLOR: RoomId = RoomId(1);

/// Hall mat (4,0) leads into the parlor; parlor mat (0,0) leads back.
fn two_rooms() -> World {
    let mut world = World::new();
    world.add_room(room(0, &["....e", "....."])).unwrap();
    world.add_room(room(1, &["w...", "...."])).unwrap();
    world
        .add_transition(HALL, Transition::new(p(4, 0), PARLOR, p(1, 0), Direction::East))
        .unwrap();
    world
        .add_transition(PARLOR, Transition::new(p(0, 0), HALL, p(3, 0), Direction::West))
        .unwrap();
    world.validate().unwrap();
    world
}

fn run_until_transition(world: &mut World, agent: usize, max_ticks: usize) -> StepOutcome {
    for _ in 0..max_ticks {
        let report = world.tick();
        if let Some(outcome @ StepOutcome::Transitioned { .. }) = report.outcome(agent) {
            return outcome;
        }
    }
    panic!("agent {agent} never transitioned");
}

#[test]
fn walking_onto_a_mat_hands_the_agent_off_both_ways() {
    let mut world = two_rooms();
    let detective = world.spawn(AgentKind::Player, HALL, p(0, 0)).unwrap();

    assert!(world.set_target(detective, p(4, 0)));
    assert_eq!(
        run_until_transition(&mut world, detective, 10),
        StepOutcome::Transitioned {
            from_room: HALL,
            to_room: PARLOR,
            at: p(1, 0),
            facing: Direction::East,
        }
    );
    let state = world.agent(detective).unwrap();
    assert_eq!((state.room, state.position, state.facing), (PARLOR, p(1, 0), Direction::East));
    assert!(state.path.is_empty());

    assert!(world.set_target(detective, p(0, 0)));
    assert_eq!(
        run_until_transition(&mut world, detective, 10),
        StepOutcome::Transitioned {
            from_room: PARLOR,
            to_room: HALL,
            at: p(3, 0),
            facing: Direction::West,
        }
    );
    let state = world.agent(detective).unwrap();
    assert_eq!((state.room, state.position, state.facing), (HALL, p(3, 0), Direction::West));
}

#[test]
fn transition_happens_on_the_tick_the_mat_is_reached() {
    let mut world = two_rooms();
    let detective = world.spawn(AgentKind::Player, HALL, p(3, 0)).unwrap();
    world.set_target(detective, p(4, 0));

    let report = world.tick();
    assert!(matches!(
        report.outcome(detective),
        Some(StepOutcome::Transitioned { to_room: PARLOR, .. })
    ));
}

#[test]
fn hand_off_waits_for_an_occupied_entry_tile() {
    let mut world = two_rooms();
    let detective = world.spawn(AgentKind::Player, HALL, p(3, 0)).unwrap();
    let butler = world.spawn(AgentKind::Npc, PARLOR, p(1, 0)).unwrap();

    world.set_target(detective, p(4, 0));
    let report = world.tick();
    assert_eq!(
        report.outcome(detective),
        Some(StepOutcome::HandOffDeferred {
            to_room: PARLOR,
            at: p(1, 0)
        })
    );
    assert_eq!(world.agent(detective).unwrap().room, HALL);

    let report = world.tick();
    assert!(matches!(
        report.outcome(detective),
        Some(StepOutcome::HandOffDeferred { .. })
    ));

    assert!(world.set_target(butler, p(3, 1)));
    let report = world.tick();
    assert_eq!(
        report.outcome(butler),
        Some(StepOutcome::Stepped {
            from: p(1, 0),
            to: p(2, 0)
        })
    );
    assert!(matches!(
        report.outcome(detective),
        Some(StepOutcome::HandOffDeferred { .. })
    ));
    assert_eq!(world.agent(detective).unwrap().room, HALL);

    let report = world.tick();
    assert!(matches!(
        report.outcome(detective),
        Some(StepOutcome::Transitioned { to_room: PARLOR, .. })
    ));
    assert_eq!(world.agent(detective).unwrap().position, p(1, 0));
}

#[test]
fn a_tile_vacated_this_tick_is_not_a_hand_off_target() {
    let mut world = two_rooms();
    let walker = world.spawn(AgentKind::Npc, HALL, p(3, 0)).unwrap();
    let occupant = world.spawn(AgentKind::Npc, PARLOR, p(1, 0)).unwrap();
    world.set_target(walker, p(4, 0));
    world.set_target(occupant, p(3, 0));

    let report = world.tick();
    assert_eq!(
        report.outcome(occupant),
        Some(StepOutcome::Stepped {
            from: p(1, 0),
            to: p(2, 0)
        })
    );
    assert_eq!(
        report.outcome(walker),
        Some(StepOutcome::HandOffDeferred {
            to_room: PARLOR,
            at: p(1, 0)
        })
    );
    let state = world.agent(walker).unwrap();
    assert_eq!((state.room, state.position), (HALL, p(4, 0)));

    assert!(matches!(
        world.tick().outcome(walker),
        Some(StepOutcome::Transitioned { at, .. }) if at == p(1, 0)
    ));
}

/// Travels to the hall mat, then gives up once a hand-off has been deferred.
struct GivesUp {
    id: usize,
    waited: bool,
}

impl Controller for GivesUp {
    fn id(&self) -> usize {
        self.id
    }

    fn intent(&mut self, view: &AgentView) -> Intent {
        if view.agent.pending_handoff {
            self.waited = true;
            return Intent::Stop;
        }
        if self.waited {
            Intent::Continue
        } else {
            Intent::Travel(p(4, 0))
        }
    }
}

#[test]
fn stopping_cancels_a_deferred_hand_off() {
    let mut world = two_rooms();
    let blocker = world.spawn(AgentKind::Npc, PARLOR, p(1, 0)).unwrap();
    let quitter = world
        .add_agent(
            AgentKind::Npc,
            HALL,
            p(3, 0),
            Box::new(GivesUp {
                id: 5,
                waited: false,
            }),
        )
        .unwrap();

    assert!(matches!(
        world.tick().outcome(quitter),
        Some(StepOutcome::HandOffDeferred { .. })
    ));
    assert!(world.agent(quitter).unwrap().pending_handoff);

    assert_eq!(world.tick().outcome(quitter), Some(StepOutcome::Idle));
    assert!(!world.agent(quitter).unwrap().pending_handoff);

    assert!(world.set_target(blocker, p(3, 1)));
    for _ in 0..4 {
        assert!(!matches!(
            world.tick().outcome(quitter),
            Some(StepOutcome::Transitioned { .. })
        ));
    }
    let state = world.agent(quitter).unwrap();
    assert_eq!((state.room, state.position), (HALL, p(4, 0)));
}

#[test]
fn direct_hand_off_only_works_on_a_mat() {
    let mut world = two_rooms();
    let on_mat = world.spawn(AgentKind::Npc, HALL, p(4, 0)).unwrap();
    let off_mat = world.spawn(AgentKind::Npc, HALL, p(0, 1)).unwrap();

    assert_eq!(world.hand_off(off_mat), None);
    assert_eq!(
        world.hand_off(on_mat),
        Some(StepOutcome::Transitioned {
            from_room: HALL,
            to_room: PARLOR,
            at: p(1, 0),
            facing: Direction::East,
        })
    );
    assert_eq!(world.hand_off(99), None);
}

#[test]
fn transition_lookup_goes_through_the_world() {
    let world = two_rooms();
    let door = world.transition_at(HALL, p(4, 0)).unwrap();
    assert_eq!((door.to_room, door.to, door.facing), (PARLOR, p(1, 0), Direction::East));
    assert!(world.transition_at(HALL, p(3, 0)).is_none());
    assert!(world.transition_at(HALL, p(40, 0)).is_none());
    assert!(world.transition_at(RoomId(5), p(0, 0)).is_none());
    assert_eq!(world.facing_at(HALL, p(4, 0)), Some(Direction::East));
}

#[test]
fn transitions_are_validated_when_declared() {
    let mut world = two_rooms();

    assert_eq!(
        world.add_transition(HALL, Transition::new(p(0, 1), RoomId(7), p(0, 0), Direction::North)),
        Err(ConfigError::UnknownRoom(RoomId(7)))
    );
    assert_eq!(
        world.add_transition(HALL, Transition::new(p(0, 1), PARLOR, p(9, 9), Direction::North)),
        Err(ConfigError::OutOfBounds {
            room: PARLOR,
            position: p(9, 9)
        })
    );
    assert_eq!(
        world.add_transition(HALL, Transition::new(p(4, 0), PARLOR, p(2, 1), Direction::North)),
        Err(ConfigError::DuplicateTransition {
            room: HALL,
            from: p(4, 0)
        })
    );
    assert_eq!(
        world.add_transition(RoomId(8), Transition::new(p(0, 0), PARLOR, p(2, 1), Direction::North)),
        Err(ConfigError::UnknownRoom(RoomId(8)))
    );
}

#[test]
fn validate_catches_dangling_builder_transitions() {
    let mut world = World::new();
    let lonely = room_builder(0, &["..e"])
        .transition(Transition::new(p(2, 0), RoomId(4), p(0, 0), Direction::East))
        .build()
        .unwrap();
    world.add_room(lonely).unwrap();
    assert_eq!(world.validate(), Err(ConfigError::UnknownRoom(RoomId(4))));
}

#[test]
fn at_most_one_incident_room() {
    let mut world = World::new();
    world
        .add_room(room_builder(0, &["..."]).incident_room(true).build().unwrap())
        .unwrap();
    let second = room_builder(1, &["..."]).incident_room(true).build().unwrap();
    assert_eq!(
        world.add_room(second),
        Err(ConfigError::IncidentRoomConflict {
            existing: RoomId(0),
            room: RoomId(1)
        })
    );

    world.add_room(room(2, &["..."])).unwrap();
    world.designate_incident_room(RoomId(2)).unwrap();
    assert_eq!(world.incident_room(), Some(RoomId(2)));
    assert!(!world.room(RoomId(0)).unwrap().is_incident_room());
    assert_eq!(
        world.designate_incident_room(RoomId(9)),
        Err(ConfigError::UnknownRoom(RoomId(9)))
    );
}

#[test]
fn opening_the_concealed_passage_enables_its_trigger() {
    let mut world = World::new();
    world.add_room(room(0, &["..*"])).unwrap();
    assert!(!world.is_trigger(RoomId(0), p(2, 0)));
    world.open_concealed_passage(RoomId(0)).unwrap();
    assert!(world.is_trigger(RoomId(0), p(2, 0)));
}

#[test]
fn a_closed_passage_does_not_hand_off() {
    let mut world = World::new();
    world.add_room(room(0, &["..*"])).unwrap();
    world.add_room(room(1, &["..."])).unwrap();
    world
        .add_transition(HALL, Transition::new(p(2, 0), PARLOR, p(0, 0), Direction::East))
        .unwrap();
    let detective = world.spawn(AgentKind::Player, HALL, p(1, 0)).unwrap();

    world.set_target(detective, p(2, 0));
    assert_eq!(world.tick().outcome(detective), Some(StepOutcome::Arrived { at: p(2, 0) }));
    assert_eq!(world.hand_off(detective), None);
    assert_eq!(world.agent(detective).unwrap().room, HALL);

    world.open_concealed_passage(HALL).unwrap();
    assert!(matches!(
        world.hand_off(detective),
        Some(StepOutcome::Transitioned { to_room: PARLOR, .. })
    ));
}
