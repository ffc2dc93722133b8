use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    Direction, Position,
    config::{EMPTY_TILE, PUZZLE_SIZE, SCRAMBLE_MOVES},
};

type Cells = [[i8; PUZZLE_SIZE]; PUZZLE_SIZE];

const TILE_COUNT: usize = PUZZLE_SIZE * PUZZLE_SIZE - 1;

/// Represents malformed puzzle layouts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PuzzleError {
    #[error("Tile value {0} is outside 0..={max} and is not the empty marker", max = TILE_COUNT - 1)]
    InvalidTile(i8),
    #[error("Tile value {0} appears more than once")]
    DuplicateTile(i8),
}

/// A single move of the empty cell, named by the direction it travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slide(pub Direction);

impl Slide {
    /// The slide that undoes this one.
    pub fn inverse(self) -> Slide {
        Slide(self.0.opposite())
    }
}

/// The 4x4 sliding-tile puzzle.
///
/// Tiles are `0..=14`, the empty cell holds [`EMPTY_TILE`]. The solved layout
/// has tile `i` at row-major index `i` and the gap in the last cell. Every
/// state produced by this type is reachable from the solved one by slides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingPuzzle {
    cells: Cells,
}

impl Default for SlidingPuzzle {
    fn default() -> Self {
        Self::solved()
    }
}

impl SlidingPuzzle {
    pub fn solved() -> Self {
        let mut cells = [[EMPTY_TILE; PUZZLE_SIZE]; PUZZLE_SIZE];
        for (index, value) in (0..TILE_COUNT as i8).enumerate() {
            cells[index / PUZZLE_SIZE][index % PUZZLE_SIZE] = value;
        }
        SlidingPuzzle { cells }
    }

    /// Builds a puzzle from explicit rows, checking that every tile and the
    /// empty marker appear exactly once.
    ///
    /// Permutation parity is not checked; a layout given here may be unsolvable.
    pub fn from_rows(rows: Cells) -> Result<Self, PuzzleError> {
        let mut seen = [false; TILE_COUNT + 1];
        for value in rows.iter().flatten().copied() {
            let slot = if value == EMPTY_TILE {
                TILE_COUNT
            } else if (0..TILE_COUNT as i8).contains(&value) {
                value as usize
            } else {
                return Err(PuzzleError::InvalidTile(value));
            };
            if seen[slot] {
                return Err(PuzzleError::DuplicateTile(value));
            }
            seen[slot] = true;
        }
        // 16 cells, 16 distinct values: nothing can be missing.
        Ok(SlidingPuzzle { cells: rows })
    }

    pub fn rows(&self) -> &Cells {
        &self.cells
    }

    /// Value at column `x`, row `y`.
    pub fn tile_at(&self, position: Position) -> Option<i8> {
        self.cells.get(position.y)?.get(position.x).copied()
    }

    /// Where `tile` currently sits.
    pub fn position_of(&self, tile: i8) -> Option<Position> {
        self.cells.iter().enumerate().find_map(|(y, row)| {
            row.iter()
                .position(|value| *value == tile)
                .map(|x| Position { x, y })
        })
    }

    /// Position of the empty cell.
    pub fn gap(&self) -> Position {
        // from_rows and every move keep exactly one gap.
        self.position_of(EMPTY_TILE)
            .unwrap_or(Position::new(PUZZLE_SIZE - 1, PUZZLE_SIZE - 1))
    }

    fn swap(&mut self, a: Position, b: Position) {
        let tmp = self.cells[a.y][a.x];
        self.cells[a.y][a.x] = self.cells[b.y][b.x];
        self.cells[b.y][b.x] = tmp;
    }

    /// Slides `tile` into the empty cell if they are orthogonally adjacent.
    ///
    /// Returns `false` and leaves the puzzle untouched otherwise, including
    /// for unknown tile values and the empty marker itself.
    pub fn attempt_move(&mut self, tile: i8) -> bool {
        if tile == EMPTY_TILE {
            return false;
        }
        let Some(position) = self.position_of(tile) else {
            return false;
        };
        let gap = self.gap();
        if position.manhattan_distance(gap) != 1 {
            return false;
        }
        self.swap(position, gap);
        true
    }

    /// Moves the empty cell one step towards `direction`.
    ///
    /// Returns `false` if that would leave the board.
    pub fn slide_gap(&mut self, direction: Direction) -> bool {
        let gap = self.gap();
        match gap.step(direction) {
            Some(target) if target.x < PUZZLE_SIZE && target.y < PUZZLE_SIZE => {
                self.swap(gap, target);
                true
            }
            _ => false,
        }
    }

    /// Applies a previously recorded slide.
    pub fn apply(&mut self, slide: Slide) -> bool {
        self.slide_gap(slide.0)
    }

    /// True when every tile sits at the row-major index equal to its value.
    pub fn is_solved(&self) -> bool {
        self.cells
            .iter()
            .flatten()
            .enumerate()
            .all(|(index, value)| *value == EMPTY_TILE || *value as usize == index)
    }

    /// Scrambles with [`SCRAMBLE_MOVES`] accepted slides of the gap.
    pub fn scramble<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<Slide> {
        self.scramble_with(rng, SCRAMBLE_MOVES)
    }

    /// Applies exactly `moves` accepted random slides of the gap and returns them.
    ///
    /// Each attempt picks an axis, then a direction on it, uniformly. Attempts
    /// that would push the gap off the board are retried and not counted.
    pub fn scramble_with<R: Rng + ?Sized>(&mut self, rng: &mut R, moves: usize) -> Vec<Slide> {
        let mut slides = Vec::with_capacity(moves);
        let mut rejected = 0usize;

        while slides.len() < moves {
            let direction = match (rng.random_bool(0.5), rng.random_bool(0.5)) {
                (true, true) => Direction::East,
                (true, false) => Direction::West,
                (false, true) => Direction::South,
                (false, false) => Direction::North,
            };
            if self.slide_gap(direction) {
                slides.push(Slide(direction));
            } else {
                rejected += 1;
            }
        }

        debug!(
            "[Puzzle] Scrambled with {} slides ({} rejected attempts)",
            slides.len(),
            rejected
        );
        slides
    }

    /// Moves `tile` and reports whether the move completed the puzzle.
    pub fn play(&mut self, tile: i8) -> Option<bool> {
        if !self.attempt_move(tile) {
            return None;
        }
        let solved = self.is_solved();
        if solved {
            info!("[Puzzle] Solved");
        }
        Some(solved)
    }
}
