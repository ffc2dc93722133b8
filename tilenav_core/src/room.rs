use std::{
    cell::OnceCell,
    collections::{BTreeSet, HashSet},
};

use rand::{Rng, seq::IteratorRandom};
use serde::{Deserialize, Serialize};

use crate::{
    Direction, EntityId, Position, RoomId, config,
    map::{Grid, GridError},
};

/// Represents configuration problems detected while assembling rooms and scenarios.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Layer '{layer}' is {width}x{height} but room {room} is {room_width}x{room_height}")]
    LayerSizeMismatch {
        room: RoomId,
        layer: String,
        width: usize,
        height: usize,
        room_width: usize,
        room_height: usize,
    },
    #[error("Room {0} has no walkable tiles")]
    NoWalkableTiles(RoomId),
    #[error("Room {room} already declares a transition at {from}")]
    DuplicateTransition { room: RoomId, from: Position },
    #[error("Position {position} is outside room {room}")]
    OutOfBounds { room: RoomId, position: Position },
    #[error("Room {0} is not registered")]
    UnknownRoom(RoomId),
    #[error("Room {0} is already registered")]
    DuplicateRoom(RoomId),
    #[error("Agent ID {0} is already in use")]
    DuplicateAgent(EntityId),
    #[error("Room {room} cannot be the incident room, {existing} already is")]
    IncidentRoomConflict { existing: RoomId, room: RoomId },
    #[error("Cannot place agent at {position} in room {room}: {reason}")]
    InvalidPlacement {
        room: RoomId,
        position: Position,
        reason: &'static str,
    },
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Per-tile properties attached to a cell of a [`Layer`].
///
/// `None` means the property is absent from the tile, which is distinct from
/// an explicit `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileProperties {
    pub walkable: Option<bool>,
    pub trigger: Option<bool>,
    pub hiding_spot: Option<bool>,
    pub direction: Option<Direction>,
}

impl TileProperties {
    /// A plain tile with no properties at all (walkable by absence).
    pub fn plain() -> Self {
        Self::default()
    }

    /// A tile explicitly marked as not walkable.
    pub fn solid() -> Self {
        TileProperties {
            walkable: Some(false),
            ..Self::default()
        }
    }

    /// A furniture tile that blocks movement and can conceal a clue.
    pub fn hiding_spot() -> Self {
        TileProperties {
            walkable: Some(false),
            hiding_spot: Some(true),
            ..Self::default()
        }
    }

    /// A door mat: a trigger tile with the facing used on the far side.
    pub fn mat(direction: Direction) -> Self {
        TileProperties {
            trigger: Some(true),
            direction: Some(direction),
            ..Self::default()
        }
    }
}

/// The semantic role a layer plays when tiles are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerRole {
    Standard,
    /// Drawn over agents; ignored for walkability.
    Overlay,
    /// Incident-scene dressing; vacant unless the room is the incident room.
    IncidentDressing,
    /// Door mats; primary source of entry facings.
    Doors,
    /// Gates the concealed passage; reports no trigger while the passage is closed.
    ConcealedPassage,
}

impl LayerRole {
    /// Infers a role from the conventional layer names used by map tools.
    ///
    /// The topmost layer of a stack is always the overlay.
    pub fn from_name(name: &str, is_last: bool) -> Self {
        if is_last {
            return LayerRole::Overlay;
        }
        match name {
            config::INCIDENT_LAYER => LayerRole::IncidentDressing,
            config::DOORS_LAYER => LayerRole::Doors,
            config::CONCEALED_PASSAGE_LAYER => LayerRole::ConcealedPassage,
            _ => LayerRole::Standard,
        }
    }
}

/// One named plane of per-tile properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    name: String,
    role: LayerRole,
    cells: Grid<Option<TileProperties>>,
}

impl Layer {
    /// Creates an empty layer (every cell absent).
    ///
    /// # Arguments
    ///
    /// * `name`: Label shown by map tools; also used by [`Room::layer_mut`].
    /// * `role`: How the layer takes part in tile classification.
    /// * `width`, `height`: Must match the room the layer is stacked into.
    pub fn new(name: impl Into<String>, role: LayerRole, width: usize, height: usize) -> Self {
        Layer {
            name: name.into(),
            role,
            cells: Grid::new(width, height),
        }
    }

    /// Creates a layer whose cells are produced by `f`.
    ///
    /// # Arguments
    ///
    /// * `name`, `role`, `width`, `height`: As for [`Layer::new`].
    /// * `f`: Returns the properties for each position, or `None` to leave it absent.
    pub fn from_generator<F>(
        name: impl Into<String>,
        role: LayerRole,
        width: usize,
        height: usize,
        f: F,
    ) -> Self
    where
        F: FnMut(Position) -> Option<TileProperties>,
    {
        Layer {
            name: name.into(),
            role,
            cells: Grid::from_generator(width, height, f),
        }
    }

    /// The layer's name as authored.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> LayerRole {
        self.role
    }

    /// Width in tiles.
    pub fn width(&self) -> usize {
        self.cells.width()
    }

    /// Height in tiles.
    pub fn height(&self) -> usize {
        self.cells.height()
    }

    /// Places (or clears, with `None`) the cell at `position`.
    pub fn set(
        &mut self,
        position: Position,
        cell: Option<TileProperties>,
    ) -> Result<(), GridError> {
        self.cells.set(position, cell)
    }

    /// The cell at `position`, `None` when absent or out of bounds.
    pub fn cell(&self, position: Position) -> Option<&TileProperties> {
        self.cells.get(position)?.as_ref()
    }
}

/// A declared link from a tile in one room to an entry tile in another.
///
/// Transitions are one-way; bidirectional travel needs one declaration per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Position,
    pub to_room: RoomId,
    pub to: Position,
    pub facing: Direction,
}

impl Transition {
    /// A link from `from` to tile `to` of `to_room`, arriving with `facing`.
    pub fn new(from: Position, to_room: RoomId, to: Position, facing: Direction) -> Self {
        Transition {
            from,
            to_room,
            to,
            facing,
        }
    }
}

/// A room: a fixed-size stack of tile layers plus its declared transitions.
///
/// Terrain queries here know nothing about agents or locks; those live in
/// [`crate::occupancy`] and are combined by [`crate::world::World`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    id: RoomId,
    name: String,
    width: usize,
    height: usize,
    layers: Vec<Layer>,
    transitions: Vec<Transition>,
    incident_room: bool,
    concealed_passage_open: bool,
    #[serde(skip)]
    hiding_spots: OnceCell<BTreeSet<Position>>,
}

impl PartialEq for Room {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Room {}

impl Room {
    /// The identifier rooms are compared and looked up by.
    pub fn id(&self) -> RoomId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Width in tiles.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in tiles.
    pub fn height(&self) -> usize {
        self.height
    }

    /// True when `position` lies inside the room.
    pub fn contains(&self, position: Position) -> bool {
        position.x < self.width && position.y < self.height
    }

    /// The layer stack, bottom first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Mutable access to the first layer called `name`.
    ///
    /// Edits do not refresh the hiding-spot cache; call
    /// [`Room::invalidate_hiding_spots`] afterwards.
    pub fn layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|layer| layer.name == name)
    }

    /// Outgoing transitions in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Whether incident dressing counts towards walkability here.
    pub fn is_incident_room(&self) -> bool {
        self.incident_room
    }

    /// Prefer [`crate::world::World::designate_incident_room`], which keeps the flag unique.
    pub fn set_incident_room(&mut self, incident: bool) {
        self.incident_room = incident;
    }

    pub fn concealed_passage_open(&self) -> bool {
        self.concealed_passage_open
    }

    /// Makes the concealed-passage layer report its triggers.
    pub fn open_concealed_passage(&mut self) {
        self.concealed_passage_open = true;
    }

    /// Hides the concealed-passage triggers again.
    pub fn close_concealed_passage(&mut self) {
        self.concealed_passage_open = false;
    }

    /// Terrain walkability of a tile.
    ///
    /// Every layer except the overlay is consulted: an explicit
    /// `walkable = false` blocks, an absent cell abstains. A coordinate where
    /// every consulted layer abstains is void, not floor. Incident dressing
    /// abstains unless this is the incident room.
    pub fn is_walkable(&self, position: Position) -> bool {
        if !self.contains(position) {
            return false;
        }

        let mut present = 0;
        for layer in &self.layers {
            match layer.role {
                LayerRole::Overlay => continue,
                LayerRole::IncidentDressing if !self.incident_room => continue,
                _ => {}
            }
            let Some(cell) = layer.cell(position) else {
                continue;
            };
            present += 1;
            if cell.walkable == Some(false) {
                return false;
            }
        }

        present > 0
    }

    /// Whether any layer marks the tile as a trigger.
    ///
    /// The concealed-passage layer is skipped while the passage is closed.
    pub fn is_trigger(&self, position: Position) -> bool {
        self.layers.iter().any(|layer| {
            if layer.role == LayerRole::ConcealedPassage && !self.concealed_passage_open {
                return false;
            }
            layer
                .cell(position)
                .is_some_and(|cell| cell.trigger == Some(true))
        })
    }

    /// Entry facing declared on a door mat, falling back to the concealed passage layer.
    pub fn facing_at(&self, position: Position) -> Option<Direction> {
        let cell_in = |role: LayerRole| {
            self.layers
                .iter()
                .find(|layer| layer.role == role)
                .and_then(|layer| layer.cell(position))
        };

        match cell_in(LayerRole::Doors) {
            Some(door) => door.direction,
            None => cell_in(LayerRole::ConcealedPassage).and_then(|cell| cell.direction),
        }
    }

    /// All tiles flagged as hiding spots on any layer.
    ///
    /// Scanned on first use and cached until [`Room::invalidate_hiding_spots`].
    pub fn hiding_spots(&self) -> &BTreeSet<Position> {
        self.hiding_spots.get_or_init(|| {
            let mut spots = BTreeSet::new();
            for layer in &self.layers {
                for (position, cell) in layer.cells.enumerate() {
                    if let Some(TileProperties {
                        hiding_spot: Some(true),
                        ..
                    }) = cell
                    {
                        spots.insert(position);
                    }
                }
            }
            spots
        })
    }

    /// Drops the cached hiding spots; the next query rescans the layers.
    pub fn invalidate_hiding_spots(&mut self) {
        self.hiding_spots.take();
    }

    /// A uniformly chosen hiding spot, or `None` if the room has none.
    pub fn random_hiding_spot<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Position> {
        self.hiding_spots().iter().copied().choose(rng)
    }

    /// The transition whose source tile is `position`, if any.
    pub fn transition_at(&self, position: Position) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.from == position)
    }

    /// Iterates over every terrain-walkable tile in row-major order.
    pub fn walkable_tiles(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.height)
            .flat_map(move |y| (0..self.width).map(move |x| Position { x, y }))
            .filter(move |position| self.is_walkable(*position))
    }

    /// Declares a transition, rejecting a second one on the same source tile.
    pub(crate) fn add_transition(&mut self, transition: Transition) -> Result<(), ConfigError> {
        if !self.contains(transition.from) {
            return Err(ConfigError::OutOfBounds {
                room: self.id,
                position: transition.from,
            });
        }
        if self.transition_at(transition.from).is_some() {
            return Err(ConfigError::DuplicateTransition {
                room: self.id,
                from: transition.from,
            });
        }
        self.transitions.push(transition);
        Ok(())
    }
}

/// Assembles a [`Room`] and validates it at load time.
#[derive(Debug, Clone)]
pub struct RoomBuilder {
    id: RoomId,
    name: String,
    width: usize,
    height: usize,
    layers: Vec<Layer>,
    transitions: Vec<Transition>,
    incident_room: bool,
    concealed_passage_open: bool,
}

impl RoomBuilder {
    /// Starts a room with no layers or transitions.
    ///
    /// # Arguments
    ///
    /// * `id`: Must be unique within a world.
    /// * `name`: Display name.
    /// * `width`, `height`: Size every layer has to match.
    pub fn new(id: RoomId, name: impl Into<String>, width: usize, height: usize) -> Self {
        RoomBuilder {
            id,
            name: name.into(),
            width,
            height,
            layers: Vec::new(),
            transitions: Vec::new(),
            incident_room: false,
            concealed_passage_open: false,
        }
    }

    /// Appends a layer on top of the stack.
    pub fn layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    /// Marks the room as the incident room.
    pub fn incident_room(mut self, incident: bool) -> Self {
        self.incident_room = incident;
        self
    }

    pub fn concealed_passage_open(mut self, open: bool) -> Self {
        self.concealed_passage_open = open;
        self
    }

    /// Declares an outgoing transition.
    ///
    /// The destination room is checked when the room joins a world.
    pub fn transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Validates the layers and produces the room.
    ///
    /// # Errors
    ///
    /// [`ConfigError::LayerSizeMismatch`] for a layer of the wrong size,
    /// [`ConfigError::DuplicateTransition`] or [`ConfigError::OutOfBounds`] for a
    /// bad transition source, and [`ConfigError::NoWalkableTiles`] when nothing
    /// in the room can be walked on.
    pub fn build(self) -> Result<Room, ConfigError> {
        for layer in &self.layers {
            if layer.width() != self.width || layer.height() != self.height {
                return Err(ConfigError::LayerSizeMismatch {
                    room: self.id,
                    layer: layer.name.clone(),
                    width: layer.width(),
                    height: layer.height(),
                    room_width: self.width,
                    room_height: self.height,
                });
            }
        }

        let mut seen = HashSet::new();
        for transition in &self.transitions {
            if !seen.insert(transition.from) {
                return Err(ConfigError::DuplicateTransition {
                    room: self.id,
                    from: transition.from,
                });
            }
        }

        let mut room = Room {
            id: self.id,
            name: self.name,
            width: self.width,
            height: self.height,
            layers: self.layers,
            transitions: Vec::with_capacity(self.transitions.len()),
            incident_room: self.incident_room,
            concealed_passage_open: self.concealed_passage_open,
            hiding_spots: OnceCell::new(),
        };
        for transition in self.transitions {
            room.add_transition(transition)?;
        }

        if room.walkable_tiles().next().is_none() {
            return Err(ConfigError::NoWalkableTiles(room.id));
        }

        Ok(room)
    }
}
