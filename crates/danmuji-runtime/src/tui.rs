use std::io;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::prelude::*;
use ratatui::widgets::*;
use tokio::sync::watch;

use danmuji_core::format::{FeedLine, Role};
use danmuji_core::{
    AggregationConfig, BufferChange, ConnectionState, Event, GiftThankConfig, RenderBuffer, Room,
};

use crate::api::RoomApi;
use crate::config::Settings;
use crate::connection::ConnectionManager;
use crate::layout::{FeedLayout, wrap};
use crate::pipeline::Pipeline;

/// Combo window choices offered by the number keys.
const COMBO_CHOICES: [u64; 4] = [0, 1, 2, 3];

// ---------------------------------------------------------------------------
// Terminal cleanup guard
// ---------------------------------------------------------------------------

/// Restores the terminal when dropped, including on panic or early `?`.
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputMode {
    Normal,
    /// Typing a room id after `c`.
    RoomId(String),
    /// Typing a gift thank template after `T`.
    Template(String),
}

/// What the event loop should do after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    None,
    Connect(String),
    Disconnect,
    Refresh,
    SetCombo(u64),
    ToggleThanks,
    /// Save a new thank template; empty keeps the current one.
    SetTemplate(String),
}

struct App {
    conn_state: ConnectionState,
    room: Option<Room>,
    popularity: Option<i64>,
    combo: AggregationConfig,
    thanks: Option<GiftThankConfig>,
    mode: InputMode,
    status: String,
    appended: u64,
    pruned: u64,
    should_quit: bool,
}

impl App {
    fn new(combo: AggregationConfig) -> Self {
        Self {
            conn_state: ConnectionState::Uninstantiated,
            room: None,
            popularity: None,
            combo,
            thanks: None,
            mode: InputMode::Normal,
            status: String::new(),
            appended: 0,
            pruned: 0,
            should_quit: false,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return Action::None;
        }

        match &mut self.mode {
            InputMode::Normal => {}
            InputMode::RoomId(input) => {
                match key.code {
                    KeyCode::Char(ch) if ch.is_ascii_digit() => input.push(ch),
                    KeyCode::Backspace => {
                        input.pop();
                    }
                    KeyCode::Enter => {
                        let room_id = std::mem::take(input);
                        self.mode = InputMode::Normal;
                        if !room_id.is_empty() {
                            return Action::Connect(room_id);
                        }
                    }
                    KeyCode::Esc => self.mode = InputMode::Normal,
                    _ => {}
                }
                return Action::None;
            }
            InputMode::Template(input) => {
                match key.code {
                    KeyCode::Char(ch) => input.push(ch),
                    KeyCode::Backspace => {
                        input.pop();
                    }
                    KeyCode::Enter => {
                        let template = std::mem::take(input);
                        self.mode = InputMode::Normal;
                        return Action::SetTemplate(template);
                    }
                    KeyCode::Esc => self.mode = InputMode::Normal,
                    _ => {}
                }
                return Action::None;
            }
        }

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Action::None
            }
            KeyCode::Char('c') => {
                self.mode = InputMode::RoomId(String::new());
                Action::None
            }
            KeyCode::Char('d') => Action::Disconnect,
            KeyCode::Char('r') => Action::Refresh,
            KeyCode::Char('t') => Action::ToggleThanks,
            KeyCode::Char('T') => {
                self.mode = InputMode::Template(String::new());
                Action::None
            }
            KeyCode::Char(ch) => ch
                .to_digit(10)
                .map(u64::from)
                .filter(|n| COMBO_CHOICES.contains(n))
                .map_or(Action::None, Action::SetCombo),
            _ => Action::None,
        }
    }

    /// Track buffer changes: counters and the latest popularity value.
    fn observe(&mut self, change: BufferChange, buffer: &RenderBuffer) {
        match change {
            BufferChange::Appended { id } => {
                self.appended += 1;
                let latest = buffer.items().rev().find(|item| item.id == id);
                if let Some(Event::RoomPopularity(n)) = latest.map(|item| &item.event) {
                    self.popularity = Some(*n);
                }
            }
            BufferChange::Pruned { count } => self.pruned += count as u64,
            BufferChange::Cleared => self.popularity = None,
        }
    }

    fn thanks_label(&self) -> &'static str {
        match &self.thanks {
            Some(cfg) if cfg.open => "on",
            Some(_) => "off",
            None => "?",
        }
    }

    fn combo_label(&self) -> String {
        match self.combo.combo_window_secs {
            None | Some(0) => "off".to_string(),
            Some(secs) => format!("{secs}s"),
        }
    }
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

/// Run the interactive feed until `q` or Ctrl+C.
pub async fn run_tui<A: RoomApi>(
    mut manager: ConnectionManager<A>,
    settings: &Settings,
    initial_room: Option<String>,
) -> anyhow::Result<()> {
    let (combo_tx, combo_rx) = watch::channel(settings.aggregation);
    let mut pipeline = Pipeline::new(combo_rx);
    let changes = pipeline.buffer_mut().subscribe();
    let mut state_rx = manager.state();
    let mut app = App::new(settings.aggregation);

    match manager.api().gift_config().await {
        Ok(cfg) => app.thanks = Some(cfg),
        Err(e) => tracing::warn!(error = %e, "could not load gift thank config"),
    }
    match initial_room {
        Some(room_id) => perform(Action::Connect(room_id), &mut app, &mut manager, &combo_tx).await,
        None => perform(Action::Refresh, &mut app, &mut manager, &combo_tx).await,
    }

    enable_raw_mode()?;
    let _guard = TerminalGuard;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let tolerance = settings.prune_tolerance_rows;

    loop {
        let mut layout = FeedLayout::default();
        terminal.draw(|frame| layout = render(frame, &app, pipeline.buffer(), tolerance))?;
        pipeline.buffer_mut().prune(&layout);
        drain(&changes, &mut app, pipeline.buffer());

        if app.should_quit {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                while event::poll(Duration::from_millis(0))? {
                    // Resize needs no handling beyond the redraw at the top.
                    if let TermEvent::Key(key) = event::read()? {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        let action = app.handle_key(key);
                        perform(action, &mut app, &mut manager, &combo_tx).await;
                    }
                }
            }
            feed = manager.recv() => {
                pipeline.push(feed);
            }
            _ = pipeline.deadline() => {
                pipeline.flush_due();
            }
            Ok(()) = state_rx.changed() => {
                app.conn_state = *state_rx.borrow_and_update();
            }
        }
        drain(&changes, &mut app, pipeline.buffer());
    }

    terminal.show_cursor()?;
    manager.shutdown();
    Ok(())
}

fn drain(changes: &std_mpsc::Receiver<BufferChange>, app: &mut App, buffer: &RenderBuffer) {
    for change in changes.try_iter() {
        app.observe(change, buffer);
    }
}

async fn perform<A: RoomApi>(
    action: Action,
    app: &mut App,
    manager: &mut ConnectionManager<A>,
    combo_tx: &watch::Sender<AggregationConfig>,
) {
    match action {
        Action::None => {}
        Action::Connect(room_id) => {
            app.status = match manager.connect(&room_id).await {
                Some(room) => format!("connected to {} ({})", room.roomid, room.uname),
                None => format!("could not connect to room {room_id}"),
            };
        }
        Action::Disconnect => {
            app.status = if manager.disconnect().await {
                "disconnected".to_string()
            } else {
                "disconnect failed".to_string()
            };
        }
        Action::Refresh => {
            app.status = match manager.sync_status().await {
                Some(room) => format!("following room {}", room.roomid),
                None => "backend holds no room; press c to connect".to_string(),
            };
        }
        Action::SetCombo(secs) => {
            let config = AggregationConfig::with_window_secs(secs);
            combo_tx.send_replace(config);
            app.combo = config;
            app.status = format!("gift combo {}", app.combo_label());
        }
        Action::ToggleThanks => {
            let Some(mut cfg) = current_thanks(app, manager).await else {
                return;
            };
            cfg.open = !cfg.open;
            let done = format!("gift thanks {}", if cfg.open { "on" } else { "off" });
            save_thanks(cfg, done, app, manager).await;
        }
        Action::SetTemplate(template) => {
            let Some(mut cfg) = current_thanks(app, manager).await else {
                return;
            };
            if !template.trim().is_empty() {
                cfg.template = template;
            }
            let done = format!("thank template: {}", cfg.template);
            save_thanks(cfg, done, app, manager).await;
        }
    }
    app.room = manager.room().cloned();
    app.conn_state = manager.current_state();
}

/// Thank config to edit: the cached one, else fetched from the backend.
async fn current_thanks<A: RoomApi>(
    app: &mut App,
    manager: &ConnectionManager<A>,
) -> Option<GiftThankConfig> {
    if let Some(cfg) = &app.thanks {
        return Some(cfg.clone());
    }
    let fetched = manager.api().gift_config().await.ok();
    if fetched.is_none() {
        app.status = "gift thank config unavailable".to_string();
    }
    fetched
}

async fn save_thanks<A: RoomApi>(
    cfg: GiftThankConfig,
    done: String,
    app: &mut App,
    manager: &ConnectionManager<A>,
) {
    match manager.api().set_gift_config(&cfg).await {
        Ok(()) => {
            app.status = done;
            app.thanks = Some(cfg);
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not save gift thank config");
            app.status = "saving gift thank config failed".to_string();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Draw one frame and return the feed layout it used.
fn render(frame: &mut Frame, app: &App, buffer: &RenderBuffer, tolerance: u16) -> FeedLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(3),    // Feed
            Constraint::Length(3), // Status / help
        ])
        .split(frame.area());

    frame.render_widget(header(app), chunks[0]);

    let block = Block::default().borders(Borders::ALL).title(" Feed ");
    let inner = block.inner(chunks[1]);
    frame.render_widget(block, chunks[1]);

    let thanks = app.thanks.as_ref();
    let mut heights = Vec::with_capacity(buffer.len());
    let mut rows = Vec::new();
    for item in buffer.items() {
        let wrapped = wrap(&FeedLine::build(&item.event, thanks), inner.width);
        heights.push((item.id, wrapped.len()));
        rows.extend(wrapped);
    }
    let layout = FeedLayout::new(heights, inner.height, tolerance);

    let visible: Vec<Line> = rows
        .into_iter()
        .skip(layout.top())
        .map(|row| {
            Line::from(
                row.into_iter()
                    .map(|(text, role)| Span::styled(text, role_style(role)))
                    .collect::<Vec<_>>(),
            )
        })
        .collect();
    frame.render_widget(Paragraph::new(visible), inner);

    frame.render_widget(footer(app, buffer.len()), chunks[2]);
    layout
}

fn header(app: &App) -> Paragraph<'static> {
    let state_style = match app.conn_state {
        ConnectionState::Open => Style::default().fg(Color::Green),
        ConnectionState::Connecting => Style::default().fg(Color::Yellow),
        _ => Style::default().fg(Color::Red),
    };
    let room = match &app.room {
        Some(room) => format!("room {} {} | {}", room.roomid, room.uname, room.content),
        None => "no room".to_string(),
    };
    let mut spans = vec![
        Span::styled(app.conn_state.to_string(), state_style),
        Span::raw(format!(" | {room}")),
    ];
    if let Some(n) = app.popularity {
        spans.push(Span::styled(format!(" | 人气 {n}"), role_style(Role::Popularity)));
    }
    spans.push(Span::raw(format!(
        " | combo {} | thanks {}",
        app.combo_label(),
        app.thanks_label()
    )));
    Paragraph::new(Line::from(spans)).block(
        Block::default()
            .title(" DANMUJI ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    )
}

fn footer(app: &App, buffered: usize) -> Paragraph<'static> {
    let text = match &app.mode {
        InputMode::RoomId(input) => format!(" room id: {input}_   (Enter: connect | Esc: cancel)"),
        InputMode::Template(input) => format!(
            " template: {input}_   (Enter: save, empty keeps current | Esc: cancel)"
        ),
        InputMode::Normal => {
            let mut text = String::from(" c: connect | d: disconnect | r: refresh | 0-3: combo | t: thanks | T: template | q: quit");
            if !app.status.is_empty() {
                text.push_str(&format!(" | {}", app.status));
            }
            text.push_str(&format!(
                " | {buffered} shown, {} seen, {} pruned",
                app.appended, app.pruned
            ));
            text
        }
    };
    Paragraph::new(text).block(Block::default().borders(Borders::ALL))
}

fn role_style(role: Role) -> Style {
    match role {
        Role::Time => Style::default().fg(Color::Green),
        Role::Manager => Style::default().fg(Color::LightGreen).bold(),
        Role::Guard => Style::default().fg(Color::Blue),
        Role::Medal => Style::default().fg(Color::Cyan),
        Role::Sender => Style::default().fg(Color::LightCyan),
        Role::Gift => Style::default().fg(Color::Yellow),
        Role::Popularity => Style::default().fg(Color::Magenta),
        Role::Content | Role::Plain => Style::default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
