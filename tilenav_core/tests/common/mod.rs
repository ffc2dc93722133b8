#![allow(dead_code)]

use tilenav_core::{
    Direction, Position, RoomId,
    room::{Layer, LayerRole, Room, RoomBuilder, TileProperties},
};

/// Builds a room from ASCII rows.
///
/// `.` floor, `#` wall, `_` void, `H` furniture hiding spot, `B` incident
/// dressing, `n`/`e`/`s`/`w` door mats with that entry facing, `*` concealed
/// passage mat facing north.
pub fn room_builder(id: usize, rows: &[&str]) -> RoomBuilder {
    let height = rows.len();
    let width = rows.first().map_or(0, |row| row.len());
    let at = |p: Position| rows[p.y].as_bytes()[p.x];

    let floor = Layer::from_generator("Floor", LayerRole::Standard, width, height, |p| {
        (at(p) != b'_').then(TileProperties::plain)
    });
    let walls = Layer::from_generator("Walls", LayerRole::Standard, width, height, |p| {
        match at(p) {
            b'#' => Some(TileProperties::solid()),
            b'H' => Some(TileProperties::hiding_spot()),
            _ => None,
        }
    });
    let blood = Layer::from_generator("Blood", LayerRole::IncidentDressing, width, height, |p| {
        (at(p) == b'B').then(TileProperties::solid)
    });
    let doors = Layer::from_generator("Doors", LayerRole::Doors, width, height, |p| {
        let facing = match at(p) {
            b'n' => Direction::North,
            b'e' => Direction::East,
            b's' => Direction::South,
            b'w' => Direction::West,
            _ => return None,
        };
        Some(TileProperties::mat(facing))
    });
    let secret = Layer::from_generator(
        "Secret Door",
        LayerRole::ConcealedPassage,
        width,
        height,
        |p| (at(p) == b'*').then(|| TileProperties::mat(Direction::North)),
    );
    let overlay = Layer::new("Overlay", LayerRole::Overlay, width, height);

    RoomBuilder::new(RoomId(id), format!("Room {id}"), width, height)
        .layer(floor)
        .layer(walls)
        .layer(blood)
        .layer(doors)
        .layer(secret)
        .layer(overlay)
}

pub fn room(id: usize, rows: &[&str]) -> Room {
    room_builder(id, rows).build().expect("valid test room")
}

/// An unobstructed `size` x `size` room.
pub fn open_room(id: usize, size: usize) -> Room {
    let row = ".".repeat(size);
    let rows: Vec<&str> = (0..size).map(|_| row.as_str()).collect();
    room(id, &rows)
}

pub fn p(x: usize, y: usize) -> Position {
    Position::new(x, y)
}
