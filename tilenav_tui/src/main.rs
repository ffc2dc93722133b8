mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::IteratorRandom};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use scenario::load_scenario_from_string;
use std::{
    io::{self, Stdout},
    path::PathBuf,
    time::{Duration, Instant},
};
use tilenav_core::{
    EntityId, Position, RoomId,
    config::EMPTY_TILE,
    controller::Wanderer,
    puzzle::SlidingPuzzle,
    room::{LayerRole, Room},
    world::{AgentKind, AgentState, StepOutcome, TickReport, World},
};

/// Room whose concealed passage opens when the puzzle is solved.
const PASSAGE_ROOM: RoomId = RoomId(0);

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Scenario file to load
    #[arg(short, long, value_name = "MAP_FILE", default_value = "maps/manor.txt")]
    map: PathBuf,

    /// Seed for NPC placement, NPC behaviour and the puzzle scramble
    #[arg(short, long)]
    seed: Option<u64>,

    /// Milliseconds between simulation ticks
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,

    /// Number of wandering NPCs to spawn
    #[arg(long, default_value_t = 3)]
    npcs: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Map,
    Puzzle,
}

struct App {
    /// The navigation engine.
    world: World,
    /// Agent moved by the arrow keys.
    player: EntityId,
    puzzle: SlidingPuzzle,
    view: View,
    /// Last simulation step, shown next to the agent list.
    last_report: Option<TickReport>,
    status: String,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(source: &str, seed: u64, npcs: usize) -> Result<Self> {
        let scenario = load_scenario_from_string(source)?;
        let mut world = scenario.world;
        let (start_room, start) = scenario.start;
        let mut rng = StdRng::seed_from_u64(seed);

        let player = world.spawn(AgentKind::Player, start_room, start)?;

        let rooms: Vec<RoomId> = world.rooms().map(Room::id).collect();
        for _ in 0..npcs {
            let Some(room) = rooms.iter().copied().choose(&mut rng) else {
                break;
            };
            let Some(position) = world.random_location(room, &mut rng) else {
                warn!("[App] No free tile left for an NPC in {}", room);
                continue;
            };
            let id = world.reserve_entity_id();
            world.add_agent(
                AgentKind::Npc,
                room,
                position,
                Box::new(Wanderer::new(id, rng.random())),
            )?;
        }

        let mut puzzle = SlidingPuzzle::solved();
        puzzle.scramble(&mut rng);
        info!("[App] Loaded {} rooms, seed {}", rooms.len(), seed);

        Ok(App {
            world,
            player,
            puzzle,
            view: View::Map,
            last_report: None,
            status: String::from("Explore the manor."),
            should_quit: false,
        })
    }

    fn player_state(&self) -> Option<&AgentState> {
        self.world.agent(self.player)
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) {
        let report = self.world.tick();
        if let Some(StepOutcome::Transitioned { to_room, .. }) = report.outcome(self.player) {
            let name = self.world.room(to_room).map_or("?", Room::name);
            self.status = format!("You enter the {name}.");
        }
        self.last_report = Some(report);
    }

    /// Walks the player one tile in `direction`.
    fn walk(&mut self, direction: tilenav_core::Direction) {
        let Some(target) = self
            .player_state()
            .and_then(|player| player.position.step(direction))
        else {
            return;
        };
        if !self.world.set_target(self.player, target) {
            self.status = String::from("Something is in the way.");
        }
    }

    fn slide(&mut self, direction: tilenav_core::Direction) {
        if self.puzzle.is_solved() || !self.puzzle.slide_gap(direction) {
            return;
        }
        if self.puzzle.is_solved() {
            match self.world.open_concealed_passage(PASSAGE_ROOM) {
                Ok(()) => self.status = String::from("A click behind the bookcase..."),
                Err(err) => warn!("[App] Puzzle solved but the passage stays shut: {}", err),
            }
            self.view = View::Map;
        }
    }

    fn toggle_puzzle(&mut self) {
        self.view = match self.view {
            View::Map => View::Puzzle,
            View::Puzzle => View::Map,
        };
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let source = std::fs::read_to_string(&args.map)
        .with_context(|| format!("Failed to read map file {}", args.map.display()))?;
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut app = App::new(&source, seed, args.npcs)
        .with_context(|| format!("Failed to load {}", args.map.display()))?;

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));

    // Restore the terminal state even if the loop failed
    restore_terminal(&mut terminal)?;

    result
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn arrow(code: KeyCode) -> Option<tilenav_core::Direction> {
    use tilenav_core::Direction as D;
    match code {
        KeyCode::Right => Some(D::East),
        KeyCode::Down => Some(D::South),
        KeyCode::Left => Some(D::West),
        KeyCode::Up => Some(D::North),
        _ => None,
    }
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match (key.code, app.view) {
                    (KeyCode::Char('q') | KeyCode::Esc, _) => app.quit(),
                    (KeyCode::Char('p'), _) => app.toggle_puzzle(),
                    (code, View::Map) => {
                        if let Some(direction) = arrow(code) {
                            app.walk(direction);
                        }
                    }
                    (code, View::Puzzle) => {
                        if let Some(direction) = arrow(code) {
                            app.slide(direction);
                        }
                    }
                }
            }
        }

        // The world keeps moving while the puzzle is open.
        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(70), // Area for the room or puzzle
            Constraint::Percentage(20), // Area for agents
            Constraint::Percentage(10), // Area for status/help
        ])
        .split(frame.area());

    match app.view {
        View::Map => render_room(frame, main_layout[0], app),
        View::Puzzle => render_puzzle(frame, main_layout[0], &app.puzzle),
    }

    render_agents(frame, main_layout[1], app);

    let help = match app.view {
        View::Map => "Arrows: walk   p: puzzle   q/Esc: quit",
        View::Puzzle => "Arrows: slide the gap   p: back to the map   q/Esc: quit",
    };
    let status_text = Paragraph::new(vec![Line::from(app.status.as_str()), Line::from(help)])
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status_text, main_layout[2]);
}

/// Lists every agent with its room, position and last outcome.
fn render_agents(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .world
        .agents()
        .iter()
        .map(|agent| {
            let outcome = app
                .last_report
                .as_ref()
                .and_then(|report| report.outcome(agent.id))
                .map_or_else(String::new, |outcome| format!("{outcome:?}"));
            let style = match agent.kind {
                AgentKind::Player => Style::default().fg(Color::Red),
                AgentKind::Npc => Style::default().fg(Color::Cyan),
            };
            ListItem::from(Line::from(vec![
                Span::styled(format!("{:?} {}", agent.kind, agent.id), style),
                Span::raw(format!(
                    " {} {} facing {:?} {}",
                    agent.room, agent.position, agent.facing, outcome
                )),
            ]))
        })
        .collect();

    let tick = app.world.tick_count();
    let agents_widget = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Agents (tick {tick})")),
    );
    frame.render_widget(agents_widget, area);
}

fn tile_span(room: &Room, position: Position) -> Span<'static> {
    let incident_dressing = room
        .layers()
        .iter()
        .any(|layer| layer.role() == LayerRole::IncidentDressing && layer.cell(position).is_some());

    if room.hiding_spots().contains(&position) {
        Span::styled("H", Style::default().fg(Color::Yellow))
    } else if incident_dressing {
        Span::styled("x", Style::default().fg(Color::Red))
    } else if room.is_trigger(position) {
        Span::styled("+", Style::default().fg(Color::Green))
    } else if room.is_walkable(position) {
        Span::styled(".", Style::default().fg(Color::DarkGray))
    } else if room.layers().iter().any(|layer| layer.cell(position).is_some()) {
        Span::styled("#", Style::default().fg(Color::Gray))
    } else {
        Span::raw(" ")
    }
}

/// Renders the room the player is currently in.
fn render_room(frame: &mut Frame, area: Rect, app: &App) {
    let Some(room) = app
        .player_state()
        .and_then(|player| app.world.room(player.room))
    else {
        return;
    };
    let occupants: Vec<&AgentState> = app
        .world
        .agents()
        .iter()
        .filter(|agent| agent.room == room.id())
        .collect();

    let mut lines: Vec<Line> = Vec::with_capacity(room.height());
    for y in 0..room.height() {
        let mut spans: Vec<Span> = Vec::with_capacity(room.width());
        for x in 0..room.width() {
            let position = Position::new(x, y);
            let span = match occupants.iter().find(|agent| agent.position == position) {
                Some(agent) if agent.kind == AgentKind::Player => {
                    Span::styled("@", Style::default().fg(Color::Red).bold())
                }
                Some(_) => Span::styled("&", Style::default().fg(Color::Cyan).bold()),
                None => tile_span(room, position),
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let title = format!("{} ({})", room.name(), room.id());
    let room_widget = Paragraph::new(lines)
        .block(Block::default().title(title).borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(room_widget, area);
}

/// Renders the sliding puzzle as a grid of numbered tiles.
fn render_puzzle(frame: &mut Frame, area: Rect, puzzle: &SlidingPuzzle) {
    let lines: Vec<Line> = puzzle
        .rows()
        .iter()
        .map(|row| {
            Line::from(
                row.iter()
                    .map(|value| match *value {
                        EMPTY_TILE => Span::raw(" [  ]"),
                        tile => Span::styled(
                            format!(" [{tile:>2}]"),
                            Style::default().fg(Color::Yellow),
                        ),
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .collect();

    let title = if puzzle.is_solved() {
        "Puzzle (solved)"
    } else {
        "Puzzle"
    };
    let puzzle_widget = Paragraph::new(lines)
        .block(Block::default().title(title).borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(puzzle_widget, area);
}
