//! Engine constants.
//!
//! Gameplay-independent parameters of the navigation engine and the puzzle.

/// Side length of the sliding-tile puzzle.
pub const PUZZLE_SIZE: usize = 4;

/// Number of accepted gap slides applied by [`crate::puzzle::SlidingPuzzle::scramble`].
pub const SCRAMBLE_MOVES: usize = 500;

/// Marker stored in the puzzle cell that holds no tile.
pub const EMPTY_TILE: i8 = -1;

/// Layer name of the incident-scene dressing (only solid in the incident room).
pub const INCIDENT_LAYER: &str = "Blood";

/// Layer name carrying door mats and their entry facing.
pub const DOORS_LAYER: &str = "Doors";

/// Layer name gating the concealed passage.
pub const CONCEALED_PASSAGE_LAYER: &str = "Secret Door";
