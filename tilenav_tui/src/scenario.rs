use anyhow::{Context, Result, anyhow, bail, ensure};
use tilenav_core::{
    Direction, Position, RoomId,
    room::{Layer, LayerRole, RoomBuilder, TileProperties, Transition},
    world::World,
};

/// Layer stack every scenario room is built with, bottom to top.
const LAYERS: [&str; 6] = ["Floor", "Furniture", "Blood", "Doors", "Secret Door", "Overlay"];

/// A loaded world plus where the player enters it.
pub struct Scenario {
    pub world: World,
    pub start: (RoomId, Position),
}

/// What one map token contributes to each layer of [`LAYERS`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Tile {
    floor: bool,
    furniture: Option<TileProperties>,
    blood: bool,
    door: Option<Direction>,
    secret: Option<Direction>,
    overlay: bool,
    start: bool,
}

fn parse_token(token: &str) -> Option<Tile> {
    let floor = Tile {
        floor: true,
        ..Tile::default()
    };
    let tile = match token {
        "FL" => floor,
        "ST" => Tile {
            start: true,
            ..floor
        },
        "VD" => Tile::default(),
        "WL" => Tile {
            furniture: Some(TileProperties::solid()),
            ..floor
        },
        "HS" => Tile {
            furniture: Some(TileProperties::hiding_spot()),
            ..floor
        },
        "BL" => Tile {
            blood: true,
            ..floor
        },
        "RG" => Tile {
            overlay: true,
            ..floor
        },
        _ => {
            let (kind, facing) = token.split_at_checked(1)?;
            let facing = facing.parse().ok()?;
            match kind {
                "D" => Tile {
                    door: Some(facing),
                    ..floor
                },
                "S" => Tile {
                    secret: Some(facing),
                    ..floor
                },
                _ => return None,
            }
        }
    };
    Some(tile)
}

struct RoomBlock {
    id: RoomId,
    name: String,
    rows: Vec<Vec<Tile>>,
}

impl RoomBlock {
    fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    fn layer(&self, index: usize, f: impl Fn(Tile) -> Option<TileProperties>) -> Layer {
        let name = LAYERS[index];
        let role = LayerRole::from_name(name, index == LAYERS.len() - 1);
        Layer::from_generator(name, role, self.width(), self.rows.len(), |p| {
            f(self.rows[p.y][p.x])
        })
    }

    fn builder(&self) -> Result<RoomBuilder> {
        ensure!(
            !self.rows.is_empty() && self.width() > 0,
            "{} has no tile rows",
            self.id
        );

        Ok(
            RoomBuilder::new(self.id, self.name.clone(), self.width(), self.rows.len())
                .layer(self.layer(0, |t| t.floor.then(TileProperties::plain)))
                .layer(self.layer(1, |t| t.furniture))
                .layer(self.layer(2, |t| t.blood.then(TileProperties::solid)))
                .layer(self.layer(3, |t| t.door.map(TileProperties::mat)))
                .layer(self.layer(4, |t| t.secret.map(TileProperties::mat)))
                .layer(self.layer(5, |t| t.overlay.then(TileProperties::solid))),
        )
    }
}

fn parse_usize(token: Option<&str>, what: &str) -> Result<usize> {
    let token = token.ok_or_else(|| anyhow!("missing {what}"))?;
    token
        .parse()
        .with_context(|| format!("invalid {what} '{token}'"))
}

fn parse_transition(args: &[&str]) -> Result<(RoomId, Transition)> {
    ensure!(
        args.len() == 8 && args[3] == "->",
        "expected 'transition <room> <x> <y> -> <room> <x> <y> <facing>'"
    );
    let from_room = RoomId(parse_usize(Some(args[0]), "room id")?);
    let from = Position::new(
        parse_usize(Some(args[1]), "x")?,
        parse_usize(Some(args[2]), "y")?,
    );
    let to_room = RoomId(parse_usize(Some(args[4]), "room id")?);
    let to = Position::new(
        parse_usize(Some(args[5]), "x")?,
        parse_usize(Some(args[6]), "y")?,
    );
    let facing: Direction = args[7].parse()?;
    Ok((from_room, Transition::new(from, to_room, to, facing)))
}

/// Parses a scenario description into a validated world.
///
/// ```text
/// # comment
/// room 0 Study
/// WL WL DE
/// ST HS FL
/// incident 0
/// transition 0 2 0 -> 1 0 0 east
/// ```
pub fn load_scenario_from_string(source: &str) -> Result<Scenario> {
    let mut blocks: Vec<RoomBlock> = Vec::new();
    let mut incident: Option<RoomId> = None;
    let mut transitions = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let words: Vec<&str> = line.split_whitespace().collect();

        match words[0] {
            "room" => {
                let id = parse_usize(words.get(1).copied(), "room id")
                    .with_context(|| format!("line {line_no}"))?;
                let name = words[2.min(words.len())..].join(" ");
                blocks.push(RoomBlock {
                    id: RoomId(id),
                    name: if name.is_empty() { format!("Room {id}") } else { name },
                    rows: Vec::new(),
                });
            }
            "incident" => {
                let id = parse_usize(words.get(1).copied(), "room id")
                    .with_context(|| format!("line {line_no}"))?;
                if let Some(existing) = incident {
                    bail!("line {line_no}: incident room already set to {existing}");
                }
                incident = Some(RoomId(id));
            }
            "transition" => {
                let parsed =
                    parse_transition(&words[1..]).with_context(|| format!("line {line_no}"))?;
                transitions.push((line_no, parsed));
            }
            _ => {
                let block = blocks
                    .last_mut()
                    .ok_or_else(|| anyhow!("line {line_no}: tile row before any room header"))?;
                let row = words
                    .iter()
                    .map(|token| {
                        parse_token(token)
                            .ok_or_else(|| anyhow!("line {line_no}: unknown tile '{token}'"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                if let Some(first) = block.rows.first() {
                    ensure!(
                        row.len() == first.len(),
                        "line {line_no}: inconsistent width in {}: expected {}, found {}",
                        block.id,
                        first.len(),
                        row.len()
                    );
                }
                block.rows.push(row);
            }
        }
    }

    ensure!(!blocks.is_empty(), "scenario declares no rooms");

    let mut world = World::new();
    let mut start = None;
    for block in &blocks {
        let room = block
            .builder()?
            .incident_room(incident == Some(block.id))
            .build()
            .with_context(|| format!("building {}", block.id))?;
        world.add_room(room)?;

        for (y, row) in block.rows.iter().enumerate() {
            for (x, tile) in row.iter().enumerate() {
                if !tile.start {
                    continue;
                }
                ensure!(start.is_none(), "multiple start positions ('ST') found");
                start = Some((block.id, Position::new(x, y)));
            }
        }
    }

    if let Some(id) = incident {
        world.designate_incident_room(id)?;
    }
    for (line_no, (room, transition)) in transitions {
        world
            .add_transition(room, transition)
            .with_context(|| format!("line {line_no}"))?;
    }
    world.validate()?;

    let start = start.ok_or_else(|| anyhow!("no start position ('ST') found"))?;
    Ok(Scenario { world, start })
}
