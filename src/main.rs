use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use std::{
    fs::File,
    io::{self, stdout},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing_subscriber::EnvFilter;

use match3::{
    Cell, Consumable, ControllerState, Engine, LevelConfig, Line as BoardLine, MoveController,
    ObstacleKind, Objective, Pos, SelectOutcome, SpecialKind, Verdict,
};

// ============================================================================
// Visual Constants
// ============================================================================

const CELL_WIDTH: u16 = 2;
const EMPTY_CHAR: &str = "  ";
const STONE_CHAR: &str = "▓▓";
const FRAME_MS: u64 = 100;
const LOG_FILE: &str = "match3.log";

// ============================================================================
// Color Mapping
// ============================================================================

fn piece_color(piece_type: u8) -> Color {
    match piece_type {
        0 => Color::Red,
        1 => Color::Green,
        2 => Color::Blue,
        3 => Color::Yellow,
        4 => Color::Magenta,
        5 => Color::Cyan,
        6 => Color::Rgb(255, 165, 0),
        _ => Color::White,
    }
}

fn special_glyph(kind: SpecialKind) -> &'static str {
    match kind {
        SpecialKind::None => "██",
        SpecialKind::LineRow => "══",
        SpecialKind::LineCol => "││",
        SpecialKind::Bomb => "()",
        SpecialKind::Rainbow => "**",
    }
}

// ============================================================================
// App State
// ============================================================================

struct App {
    controller: MoveController,
    config: LevelConfig,
    cursor: Pos,
    hint: Option<(Pos, Pos)>,
    message: String,
}

impl App {
    fn new(config: LevelConfig) -> Result<Self, match3::ConfigError> {
        let engine = Engine::new(config.clone())?;
        Ok(Self {
            controller: MoveController::new(engine),
            config,
            cursor: Pos::new(0, 0),
            hint: None,
            message: String::new(),
        })
    }

    fn move_cursor(&mut self, d_row: isize, d_col: isize) {
        let grid = self.controller.engine().grid();
        let row = self.cursor.row.saturating_add_signed(d_row).min(grid.rows() - 1);
        let col = self.cursor.col.saturating_add_signed(d_col).min(grid.cols() - 1);
        self.cursor = Pos::new(row, col);
    }

    fn select(&mut self) {
        self.hint = None;
        self.message = match self.controller.select(self.cursor) {
            SelectOutcome::Moved(report) if !report.valid => "No match".to_string(),
            SelectOutcome::Moved(report) if report.chain_depth > 1 => {
                format!("+{} (combo x{})", report.score_gained, report.chain_depth)
            }
            SelectOutcome::Moved(report) => format!("+{}", report.score_gained),
            SelectOutcome::Rejected(reason) => reason.to_string(),
            _ => String::new(),
        };
    }

    fn use_consumable(&mut self, consumable: Consumable) {
        self.hint = None;
        self.message = match self.controller.activate_consumable(consumable) {
            Ok(report) => format!("+{}", report.score_gained),
            Err(reason) => reason.to_string(),
        };
    }

    fn reshuffle(&mut self) {
        self.hint = None;
        self.message = match self.controller.force_reshuffle() {
            Ok(_) => "Reshuffled".to_string(),
            Err(reason) => reason.to_string(),
        };
    }

    fn restart(&mut self) {
        self.hint = None;
        self.message = match self.controller.restart(self.config.clone()) {
            Ok(()) => String::new(),
            Err(err) => err.to_string(),
        };
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn render(frame: &mut Frame, app: &App) {
    let area = frame.size();

    render_game(frame, app, area);
    if let ControllerState::Terminal(verdict) = app.controller.state() {
        render_level_end(frame, app, verdict, area);
    }
}

fn render_game(frame: &mut Frame, app: &App, area: Rect) {
    let grid = app.controller.engine().grid();
    let grid_display_width = (grid.cols() as u16 * CELL_WIDTH) + 2;
    let grid_display_height = grid.rows() as u16 + 2;
    let info_width = 20;
    let total_width = grid_display_width + info_width + 2;
    let total_height = grid_display_height.max(14) + 3;

    let main_area = centered_rect(total_width, total_height, area);

    let vertical = Layout::vertical([
        Constraint::Length(grid_display_height.max(14)),
        Constraint::Fill(1),
    ])
    .split(main_area);

    let game_row = vertical[0];

    // Layout: [Grid][Info]
    let horizontal = Layout::horizontal([
        Constraint::Length(grid_display_width),
        Constraint::Length(info_width),
    ])
    .split(game_row);

    render_grid(frame, app, horizontal[0]);
    render_info(frame, app, horizontal[1]);

    let controls_area = Rect {
        x: area.x,
        y: game_row.y + game_row.height,
        width: area.width,
        height: 2,
    };

    if controls_area.y + 1 < area.height {
        let controls = Paragraph::new(vec![
            Line::from(app.message.as_str()),
            Line::from("Arrows/WASD: Move | Space: Select | R: Shuffle | H: Hint | 1-5: Items | N: New | Q: Quit"),
        ])
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(controls, controls_area);
    }
}

fn render_grid(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Match 3 ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let grid = app.controller.engine().grid();
    let selection = app.controller.selection();

    let mut lines: Vec<Line> = Vec::new();

    for row in 0..grid.rows() {
        let mut spans: Vec<Span> = Vec::new();

        for col in 0..grid.cols() {
            let pos = Pos::new(row, col);
            let (symbol, mut style) = match grid[pos] {
                Cell::Empty => (EMPTY_CHAR, Style::default()),
                Cell::Stone { .. } => (STONE_CHAR, Style::default().fg(Color::Gray)),
                Cell::Piece(piece) => {
                    let mut style = Style::default().fg(piece_color(piece.piece_type.0));
                    style = match piece.obstacle.map(|o| o.kind) {
                        Some(ObstacleKind::Ice) => style.bg(Color::LightCyan),
                        Some(ObstacleKind::Vine) => style.bg(Color::Rgb(0, 90, 0)),
                        _ => style,
                    };
                    (special_glyph(piece.special), style)
                }
            };

            if app.hint.is_some_and(|(a, b)| a == pos || b == pos) {
                style = style.add_modifier(Modifier::UNDERLINED);
            }
            if selection == Some(pos) {
                style = style.add_modifier(Modifier::REVERSED);
            } else if app.cursor == pos {
                style = style.bg(Color::DarkGray);
            }

            spans.push(Span::styled(symbol, style));
        }

        lines.push(Line::from(spans));
    }

    let paragraph = Paragraph::new(lines);
    frame.render_widget(paragraph, inner);
}

fn objective_lines(snapshot: &match3::Snapshot) -> Vec<Line<'static>> {
    match &snapshot.objective {
        Objective::Score { target } => vec![Line::from(format!("Score {target}"))],
        Objective::Collect { items } => items
            .iter()
            .map(|item| {
                let got = snapshot.collected.get(&item.piece_type).copied().unwrap_or(0);
                Line::from(Span::styled(
                    format!("{}/{}", got.min(item.count), item.count),
                    Style::default().fg(piece_color(item.piece_type.0)),
                ))
            })
            .collect(),
        Objective::Clear { .. } => vec![Line::from(format!("Obstacles {}", snapshot.obstacles_left))],
        Objective::Boss { .. } => vec![Line::from(format!(
            "Boss {}/{}",
            snapshot.boss_hp, snapshot.boss_max_hp
        ))],
    }
}

fn render_info(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Info ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let snapshot = app.controller.engine().snapshot();
    let remaining = match (snapshot.moves_left, snapshot.time_left) {
        (_, Some(seconds)) => format!("{seconds:.0}s"),
        (Some(moves), None) => format!("{moves}"),
        (None, None) => "-".to_string(),
    };

    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled("Score", Style::default().fg(Color::Yellow))),
        Line::from(format!("{}", snapshot.score)),
        Line::from(""),
        Line::from(Span::styled("Left", Style::default().fg(Color::Cyan))),
        Line::from(remaining),
        Line::from(""),
        Line::from(Span::styled("Goal", Style::default().fg(Color::Green))),
    ];
    lines.extend(objective_lines(&snapshot));

    let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(paragraph, inner);
}

fn render_level_end(frame: &mut Frame, app: &App, verdict: Verdict, area: Rect) {
    let (title, color) = match verdict {
        Verdict::Won => ("LEVEL CLEAR", Color::Green),
        _ => ("OUT OF MOVES", Color::Red),
    };

    let text = vec![
        Line::from(""),
        Line::from(Span::styled(title, Style::default().fg(color))),
        Line::from(""),
        Line::from(format!("Score: {}", app.controller.engine().snapshot().score)),
        Line::from(""),
        Line::from(Span::styled(
            "Press N to play again",
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(Span::styled(
            "Press ESC to quit",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Level Over ")
            .title_alignment(Alignment::Center)
            .style(Style::default().bg(Color::Black)),
    );

    let popup_area = centered_rect(26, 10, area);
    frame.render_widget(paragraph, popup_area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let horizontal = Layout::horizontal([
        Constraint::Fill(1),
        Constraint::Length(width.min(area.width)),
        Constraint::Fill(1),
    ])
    .split(area);

    let vertical = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(height.min(area.height)),
        Constraint::Fill(1),
    ])
    .split(horizontal[1]);

    vertical[1]
}

// ============================================================================
// Main Loop
// ============================================================================

/// Logs go to a file, and only when `RUST_LOG` asks for them; the terminal
/// belongs to the board.
fn init_logging() -> io::Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        return Ok(());
    }
    let file = File::create(LOG_FILE)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> io::Result<()> {
    init_logging()?;

    let config = LevelConfig::from_env().map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    let mut app = App::new(config).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;

    let frame_duration = Duration::from_millis(FRAME_MS);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|frame| render(frame, &app))?;

        let timeout = frame_duration
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let playing = !matches!(app.controller.state(), ControllerState::Terminal(_));
                    match key.code {
                        // Always allow quit
                        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => break,
                        KeyCode::Char('n') | KeyCode::Char('N') => app.restart(),
                        _ if playing => match key.code {
                            KeyCode::Up | KeyCode::Char('w') | KeyCode::Char('W') => app.move_cursor(-1, 0),
                            KeyCode::Down | KeyCode::Char('s') | KeyCode::Char('S') => app.move_cursor(1, 0),
                            KeyCode::Left | KeyCode::Char('a') | KeyCode::Char('A') => app.move_cursor(0, -1),
                            KeyCode::Right | KeyCode::Char('d') | KeyCode::Char('D') => app.move_cursor(0, 1),
                            KeyCode::Char(' ') | KeyCode::Enter => app.select(),
                            KeyCode::Char('r') | KeyCode::Char('R') => app.reshuffle(),
                            KeyCode::Char('h') | KeyCode::Char('H') => app.hint = app.controller.hint(),
                            KeyCode::Char('1') => app.use_consumable(Consumable::Shuffle),
                            KeyCode::Char('2') => app.use_consumable(Consumable::ExtraTime),
                            KeyCode::Char('3') => app.use_consumable(Consumable::AreaClear {
                                center: Some(app.cursor),
                            }),
                            KeyCode::Char('4') => {
                                app.use_consumable(Consumable::LineClear(BoardLine::Row(app.cursor.row)))
                            }
                            KeyCode::Char('5') => {
                                let piece_type = app.controller.engine().grid()[app.cursor].piece_type();
                                app.use_consumable(Consumable::TypeClear { piece_type });
                            }
                            _ => {}
                        },
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= frame_duration {
            app.controller.tick(last_tick.elapsed().as_secs_f64());
            last_tick = Instant::now();
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
