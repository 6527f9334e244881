//! Terminal UI state machine.
//!
//! [`App`] owns both panes and the focus. It never performs I/O: every input or async
//! completion goes through [`App::handle`], which returns the [`Effect`]s the caller must
//! carry out. Completed effects come back as [`AppEvent`]s.

use chrono::{DateTime, Local, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};
use ratatui::Frame;
use tracing::{debug, info, warn};

use crate::apexlogs_api::ApexLog;
use crate::apexlogs_trace::{Bootstrap, TraceFlagOutcome};

mod detail_pane;
mod keymap;
mod list_pane;
mod theme;

pub use detail_pane::{filter_lines, DetailPane, InputState};
pub use keymap::{Command, KeyBinding, KeyBindings, KeyParseError};
pub use list_pane::{format_size, format_start_time, format_start_time_in, ListPane};
pub use theme::Theme;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const LIST_WIDTH_PERCENT: u16 = 40;
const STATUS_HEIGHT: u16 = 1;
const HELP_COLUMNS: usize = 3;

/// Failures of the terminal itself, as opposed to failures shown inside the panes.
#[derive(Debug, thiserror::Error)]
pub enum TuiError {
    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    List,
    Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneLoadState {
    Idle,
    Loading,
    Ready,
    Empty,
    Failed,
}

/// Where the session is, derived from the pane flags, the focus and the quit flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Bootstrapping,
    ListLoading,
    ListReady,
    DetailLoading,
    DetailReady,
    Quitting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize { width: u16, height: u16 },
    Tick,
    Bootstrapped(Result<Bootstrap, String>),
    LogsLoaded { generation: u64, result: Result<Vec<ApexLog>, String> },
    BodyLoaded { generation: u64, log_id: String, result: Result<String, String> },
    Keepalive { checked_at: DateTime<Utc>, result: Result<TraceFlagOutcome, String> },
}

/// Work requested by the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Bootstrap,
    StartKeepalive { debug_level_id: String },
    FetchLogs { generation: u64 },
    FetchBody { generation: u64, log_id: String },
    StopKeepalive,
}

#[derive(Debug, Clone, Default)]
pub struct TuiConfig {
    pub keys: KeyBindings,
    pub org_label: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeepaliveStatus {
    outcome: TraceFlagOutcome,
    checked_at: Option<DateTime<Utc>>,
}

pub struct App {
    config: TuiConfig,
    theme: Theme,
    focus: FocusPane,
    list: ListPane,
    detail: DetailPane,
    bootstrapped: bool,
    quitting: bool,
    fatal: Option<String>,
    list_generation: u64,
    body_generation: u64,
    show_help: bool,
    keepalive: Option<KeepaliveStatus>,
    warning: Option<String>,
    spinner_tick: usize,
    size: Rect,
}

impl App {
    pub fn new(config: TuiConfig) -> Self {
        let mut list = ListPane::new();
        list.focus();
        Self {
            config,
            theme: Theme,
            focus: FocusPane::List,
            list,
            detail: DetailPane::new(),
            bootstrapped: false,
            quitting: false,
            fatal: None,
            list_generation: 0,
            body_generation: 0,
            show_help: false,
            keepalive: None,
            warning: None,
            spinner_tick: 0,
            size: Rect::default(),
        }
    }

    /// First effects of the session. The list shows its spinner while bootstrapping.
    pub fn start(&mut self) -> Vec<Effect> {
        self.list.start_loading();
        vec![Effect::Bootstrap]
    }

    pub fn phase(&self) -> Phase {
        if self.quitting {
            Phase::Quitting
        } else if !self.bootstrapped {
            Phase::Bootstrapping
        } else if self.list.is_loading() {
            Phase::ListLoading
        } else if self.detail.is_loading() {
            Phase::DetailLoading
        } else {
            match self.focus {
                FocusPane::List => Phase::ListReady,
                FocusPane::Detail => Phase::DetailReady,
            }
        }
    }

    pub fn focus(&self) -> FocusPane {
        self.focus
    }

    pub fn list(&self) -> &ListPane {
        &self.list
    }

    pub fn detail(&self) -> &DetailPane {
        &self.detail
    }

    pub fn should_quit(&self) -> bool {
        self.quitting
    }

    /// Startup error that ended the session, if any.
    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn handle(&mut self, event: AppEvent) -> Vec<Effect> {
        if self.quitting {
            debug!(?event, "discarding event after quit");
            return Vec::new();
        }
        match event {
            AppEvent::Key(key) => self.handle_key(key),
            AppEvent::Resize { width, height } => {
                self.resize(Rect::new(0, 0, width, height));
                Vec::new()
            }
            AppEvent::Tick => {
                self.spinner_tick = self.spinner_tick.wrapping_add(1);
                Vec::new()
            }
            AppEvent::Bootstrapped(result) => self.on_bootstrapped(result),
            AppEvent::LogsLoaded { generation, result } => {
                self.on_logs_loaded(generation, result);
                Vec::new()
            }
            AppEvent::BodyLoaded { generation, log_id, result } => {
                self.on_body_loaded(generation, log_id, result);
                Vec::new()
            }
            AppEvent::Keepalive { checked_at, result } => {
                match result {
                    Ok(outcome) => {
                        self.keepalive = Some(KeepaliveStatus { outcome, checked_at: Some(checked_at) });
                        self.warning = None;
                    }
                    Err(message) => {
                        warn!(%message, "trace flag keepalive failed");
                        self.warning = Some(format!("trace flag renewal failed: {message}"));
                    }
                }
                Vec::new()
            }
        }
    }

    fn on_bootstrapped(&mut self, result: Result<Bootstrap, String>) -> Vec<Effect> {
        match result {
            Ok(bootstrap) => {
                info!(
                    debug_level = %bootstrap.debug_level_id,
                    trace_flag = bootstrap.trace_flag.label(),
                    "bootstrap finished"
                );
                self.bootstrapped = true;
                self.keepalive = Some(KeepaliveStatus { outcome: bootstrap.trace_flag, checked_at: None });
                let mut effects =
                    vec![Effect::StartKeepalive { debug_level_id: bootstrap.debug_level_id }];
                effects.extend(self.begin_list_fetch());
                effects
            }
            Err(message) => {
                self.list.stop_loading();
                self.fatal = Some(message);
                self.quitting = true;
                Vec::new()
            }
        }
    }

    fn on_logs_loaded(&mut self, generation: u64, result: Result<Vec<ApexLog>, String>) {
        if generation != self.list_generation || !self.list.is_loading() {
            debug!(generation, latest = self.list_generation, "discarding stale log list");
            return;
        }
        self.list.stop_loading();
        match result {
            Ok(entries) => {
                debug!(count = entries.len(), "log list loaded");
                self.list.set_entries(entries);
            }
            Err(message) => {
                warn!(%message, "log list fetch failed");
                self.list.set_error(message);
            }
        }
    }

    fn on_body_loaded(&mut self, generation: u64, log_id: String, result: Result<String, String>) {
        if generation != self.body_generation || !self.detail.is_loading() {
            debug!(generation, latest = self.body_generation, %log_id, "discarding stale log body");
            return;
        }
        self.detail.stop_loading();
        match result {
            Ok(body) => {
                debug!(%log_id, bytes = body.len(), "log body loaded");
                self.detail.set_content(log_id, body);
                self.set_focus(FocusPane::Detail);
            }
            Err(message) => {
                warn!(%log_id, %message, "log body fetch failed");
                self.detail.set_error(message);
            }
        }
    }

    fn begin_list_fetch(&mut self) -> Vec<Effect> {
        self.list.clear();
        self.list.start_loading();
        self.list_generation += 1;
        vec![Effect::FetchLogs { generation: self.list_generation }]
    }

    fn refresh(&mut self) -> Vec<Effect> {
        if self.focus != FocusPane::List || self.list.is_loading() {
            return Vec::new();
        }
        self.begin_list_fetch()
    }

    fn select(&mut self) -> Vec<Effect> {
        let Some(log_id) = self.list.selected().map(str::to_string) else {
            return Vec::new();
        };
        self.detail.start_loading();
        self.body_generation += 1;
        vec![Effect::FetchBody { generation: self.body_generation, log_id }]
    }

    fn quit(&mut self) -> Vec<Effect> {
        self.quitting = true;
        vec![Effect::StopKeepalive]
    }

    fn set_focus(&mut self, focus: FocusPane) {
        self.focus = focus;
        match focus {
            FocusPane::List => {
                self.detail.blur();
                self.list.focus();
            }
            FocusPane::Detail => {
                self.list.blur();
                self.detail.focus();
            }
        }
    }

    fn toggle_focus(&mut self) {
        let next = match self.focus {
            FocusPane::List => FocusPane::Detail,
            FocusPane::Detail => FocusPane::List,
        };
        self.set_focus(next);
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        if key.kind == KeyEventKind::Release {
            return Vec::new();
        }
        let keys = &self.config.keys;

        if self.detail.is_editing_filter() {
            if keys.matches(Command::Quit, &key) && key.modifiers.contains(KeyModifiers::CONTROL) {
                return self.quit();
            }
            match keys.resolve(&key, &[Command::ApplyFilter, Command::CloseFilter, Command::ToggleFocus]) {
                Some(Command::ApplyFilter) => self.detail.submit_filter(),
                Some(Command::CloseFilter) => self.detail.close_filter(),
                Some(_) => self.toggle_focus(),
                None => match key.code {
                    KeyCode::Backspace => self.detail.input_backspace(),
                    KeyCode::Char(ch)
                        if !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
                    {
                        self.detail.input_char(ch)
                    }
                    _ => {}
                },
            }
            return Vec::new();
        }

        if keys.matches(Command::Quit, &key) {
            return self.quit();
        }
        if keys.matches(Command::ToggleHelp, &key) {
            self.show_help = !self.show_help;
            self.resize(self.size);
            return Vec::new();
        }
        if !matches!(self.phase(), Phase::ListReady | Phase::DetailReady) {
            return Vec::new();
        }
        if keys.matches(Command::ToggleFocus, &key) {
            self.toggle_focus();
            return Vec::new();
        }

        match self.focus {
            FocusPane::List => {
                let candidates = [
                    Command::Select,
                    Command::Refresh,
                    Command::Up,
                    Command::Down,
                    Command::PageUp,
                    Command::PageDown,
                    Command::Top,
                    Command::Bottom,
                ];
                match keys.resolve(&key, &candidates) {
                    Some(Command::Select) => return self.select(),
                    Some(Command::Refresh) => return self.refresh(),
                    Some(Command::Up) => self.list.move_by(-1),
                    Some(Command::Down) => self.list.move_by(1),
                    Some(Command::PageUp) => self.list.page_up(),
                    Some(Command::PageDown) => self.list.page_down(),
                    Some(Command::Top) => self.list.select_first(),
                    Some(Command::Bottom) => self.list.select_last(),
                    _ => {}
                }
            }
            FocusPane::Detail => {
                let candidates = [
                    Command::OpenFilter,
                    Command::CloseFilter,
                    Command::Up,
                    Command::Down,
                    Command::PageUp,
                    Command::PageDown,
                    Command::Top,
                    Command::Bottom,
                ];
                match keys.resolve(&key, &candidates) {
                    Some(Command::OpenFilter) => {
                        if self.detail.load_state() == PaneLoadState::Ready {
                            self.detail.open_filter();
                        }
                    }
                    Some(Command::CloseFilter) => {
                        if self.detail.is_filter_open() {
                            self.detail.close_filter();
                        }
                    }
                    Some(Command::Up) => self.detail.scroll_by(-1),
                    Some(Command::Down) => self.detail.scroll_by(1),
                    Some(Command::PageUp) => self.detail.page_up(),
                    Some(Command::PageDown) => self.detail.page_down(),
                    Some(Command::Top) => self.detail.scroll_to_top(),
                    Some(Command::Bottom) => self.detail.scroll_to_bottom(),
                    _ => {}
                }
            }
        }
        Vec::new()
    }

    fn help_commands(&self) -> Vec<Command> {
        if self.detail.is_editing_filter() {
            return vec![Command::ApplyFilter, Command::CloseFilter, Command::ToggleFocus];
        }
        let mut commands = match self.focus {
            FocusPane::List => vec![Command::Up, Command::Down, Command::Select, Command::Refresh],
            FocusPane::Detail => {
                let mut commands = vec![Command::Up, Command::Down, Command::OpenFilter];
                if self.detail.is_filter_open() {
                    commands.push(Command::CloseFilter);
                }
                commands
            }
        };
        if self.show_help {
            commands.extend([Command::PageUp, Command::PageDown, Command::Top, Command::Bottom]);
        }
        commands.extend([Command::ToggleFocus, Command::ToggleHelp, Command::Quit]);
        commands
    }

    fn footer_height(&self) -> u16 {
        if self.show_help {
            let rows = self.help_commands().len().div_ceil(HELP_COLUMNS);
            u16::try_from(rows).unwrap_or(u16::MAX)
        } else {
            1
        }
    }

    fn areas(&self, area: Rect) -> AppAreas {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(STATUS_HEIGHT),
                Constraint::Length(self.footer_height()),
            ])
            .split(area);
        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(LIST_WIDTH_PERCENT),
                Constraint::Percentage(100 - LIST_WIDTH_PERCENT),
            ])
            .split(rows[0]);
        AppAreas { list: panes[0], detail: panes[1], status: rows[1], footer: rows[2] }
    }

    fn resize(&mut self, size: Rect) {
        self.size = size;
        let areas = self.areas(size);
        self.list.set_area(areas.list);
        self.detail.set_area(areas.detail);
    }

    pub fn render(&mut self, frame: &mut Frame<'_>) {
        if frame.area() != self.size {
            self.resize(frame.area());
        }
        let areas = self.areas(self.size);
        let spinner = SPINNER_FRAMES[self.spinner_tick % SPINNER_FRAMES.len()];
        let theme = self.theme;

        self.list.render(frame, areas.list, &theme, spinner);
        self.detail.render(frame, areas.detail, &theme, spinner);
        self.render_status(frame, areas.status, spinner);
        self.render_footer(frame, areas.footer);
    }

    fn render_status(&self, frame: &mut Frame<'_>, area: Rect, spinner: &str) {
        let sep = Span::styled(" · ", self.theme.dimmed_style());
        let mut spans = vec![Span::raw(format!(" org {}", self.config.org_label))];
        if !self.config.username.is_empty() && self.config.username != self.config.org_label {
            spans.push(Span::styled(format!(" ({})", self.config.username), self.theme.dimmed_style()));
        }
        spans.push(sep.clone());
        match (self.bootstrapped, self.keepalive) {
            (false, _) => spans.push(Span::raw(format!("{spinner} preparing trace flag"))),
            (true, Some(status)) => {
                let mut text = format!("trace flag {}", status.outcome.label());
                if let Some(checked_at) = status.checked_at {
                    text.push_str(&format!(", checked {}", checked_at.with_timezone(&Local).format("%H:%M")));
                }
                spans.push(Span::raw(text));
            }
            (true, None) => {}
        }
        if let Some(warning) = &self.warning {
            spans.push(sep);
            spans.push(Span::styled(warning.clone(), self.theme.warning_style()));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)).style(self.theme.base_style()), area);
    }

    fn render_footer(&self, frame: &mut Frame<'_>, area: Rect) {
        frame.render_widget(Block::default().style(self.theme.base_style()), area);
        let key_style = self.theme.help_key_style();
        let dimmed = self.theme.dimmed_style();
        let item = |command: Command| {
            vec![
                Span::styled(self.config.keys.label(command), key_style),
                Span::raw(" "),
                Span::styled(command.description(), dimmed),
            ]
        };

        let commands = self.help_commands();
        if !self.show_help {
            let mut spans = vec![Span::raw(" ")];
            for (idx, command) in commands.into_iter().enumerate() {
                if idx > 0 {
                    spans.push(Span::styled(" • ", dimmed));
                }
                spans.extend(item(command));
            }
            frame.render_widget(Paragraph::new(Line::from(spans)), area);
            return;
        }

        let rows = commands.len().div_ceil(HELP_COLUMNS).max(1);
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Ratio(1, HELP_COLUMNS as u32); HELP_COLUMNS])
            .split(area);
        for (column, chunk) in commands.chunks(rows).enumerate() {
            let Some(column_area) = columns.get(column) else {
                break;
            };
            let lines = chunk
                .iter()
                .map(|command| {
                    let mut spans = vec![Span::raw(" ")];
                    spans.extend(item(*command));
                    Line::from(spans)
                })
                .collect::<Vec<_>>();
            frame.render_widget(Paragraph::new(lines), *column_area);
        }
    }
}

struct AppAreas {
    list: Rect,
    detail: Rect,
    status: Rect,
    footer: Rect,
}

pub(crate) fn split_for_scrollbar(area: Rect) -> (Rect, Option<Rect>) {
    if area.width <= 1 || area.height == 0 {
        return (area, None);
    }
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);
    (chunks[0], Some(chunks[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;
    use std::collections::BTreeMap;

    const LOG_ID: &str = "07L000000000ABC";

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent { code, modifiers, kind: KeyEventKind::Press, state: KeyEventState::empty() }
    }

    fn press(app: &mut App, code: KeyCode) -> Vec<Effect> {
        app.handle(AppEvent::Key(key(code, KeyModifiers::NONE)))
    }

    fn log(id: &str) -> ApexLog {
        ApexLog {
            id: id.to_string(),
            operation: "/apex/Page".to_string(),
            status: "Success".to_string(),
            start_time: "2024-05-01T12:30:00.000+0000".to_string(),
            log_length: 4096,
            ..ApexLog::default()
        }
    }

    fn make_app(config: TuiConfig) -> App {
        let mut app = App::new(config);
        app.handle(AppEvent::Resize { width: 100, height: 40 });
        app
    }

    /// Drives the app through bootstrap; returns the generation of the first list fetch.
    fn bootstrap(app: &mut App) -> u64 {
        assert_eq!(app.start(), vec![Effect::Bootstrap]);
        let effects = app.handle(AppEvent::Bootstrapped(Ok(Bootstrap {
            debug_level_id: "7dl000000000001".to_string(),
            trace_flag: TraceFlagOutcome::Created,
        })));
        match effects.as_slice() {
            [Effect::StartKeepalive { debug_level_id }, Effect::FetchLogs { generation }] => {
                assert_eq!(debug_level_id, "7dl000000000001");
                *generation
            }
            other => panic!("unexpected effects {other:?}"),
        }
    }

    fn ready_app(logs: Vec<ApexLog>) -> App {
        let mut app = make_app(TuiConfig::default());
        let generation = bootstrap(&mut app);
        app.handle(AppEvent::LogsLoaded { generation, result: Ok(logs) });
        app
    }

    fn detail_app(body: &str) -> App {
        let mut app = ready_app(vec![log(LOG_ID)]);
        let effects = press(&mut app, KeyCode::Enter);
        let [Effect::FetchBody { generation, log_id }] = effects.as_slice() else {
            panic!("expected body fetch, got {effects:?}");
        };
        app.handle(AppEvent::BodyLoaded {
            generation: *generation,
            log_id: log_id.clone(),
            result: Ok(body.to_string()),
        });
        app
    }

    fn render_to_string(app: &mut App) -> String {
        use ratatui::backend::TestBackend;
        use ratatui::Terminal;

        let backend = TestBackend::new(100, 40);
        let mut terminal = Terminal::new(backend).expect("terminal");
        terminal.draw(|frame| app.render(frame)).expect("draw");
        let buffer = terminal.backend().buffer();
        buffer.content().iter().map(|cell| cell.symbol()).collect()
    }

    #[test]
    fn startup_bootstraps_before_first_fetch() {
        let mut app = make_app(TuiConfig::default());
        assert_eq!(app.phase(), Phase::Bootstrapping);
        let generation = bootstrap(&mut app);
        assert_eq!(generation, 1);
        assert_eq!(app.phase(), Phase::ListLoading);
        assert!(app.list().is_loading());

        app.handle(AppEvent::LogsLoaded {
            generation,
            result: Ok(vec![log("07L1"), log("07L2"), log("07L3")]),
        });
        assert_eq!(app.phase(), Phase::ListReady);
        assert_eq!(app.focus(), FocusPane::List);
        assert_eq!(app.list().entries().len(), 3);
        assert_eq!(app.list().selected(), Some("07L1"));
    }

    #[test]
    fn bootstrap_failure_ends_session() {
        let mut app = make_app(TuiConfig::default());
        app.start();
        let effects = app.handle(AppEvent::Bootstrapped(Err("error creating debug level".into())));
        assert!(effects.is_empty());
        assert!(app.should_quit());
        assert_eq!(app.phase(), Phase::Quitting);
        assert_eq!(app.fatal_error(), Some("error creating debug level"));
    }

    #[test]
    fn selecting_a_log_loads_body_and_focuses_detail() {
        let mut app = ready_app(vec![log(LOG_ID)]);
        let effects = press(&mut app, KeyCode::Enter);
        assert_eq!(effects, vec![Effect::FetchBody { generation: 1, log_id: LOG_ID.to_string() }]);
        assert_eq!(app.phase(), Phase::DetailLoading);
        assert!(app.detail().is_loading());

        app.handle(AppEvent::BodyLoaded {
            generation: 1,
            log_id: LOG_ID.to_string(),
            result: Ok("line1\nline2".to_string()),
        });
        assert_eq!(app.phase(), Phase::DetailReady);
        assert_eq!(app.focus(), FocusPane::Detail);
        assert_eq!(app.detail().content(), Some("line1\nline2"));
        assert_eq!(app.detail().log_id(), Some(LOG_ID));
        assert!(app.detail().is_focused());
        assert!(!app.list().is_focused());
    }

    #[test]
    fn enter_on_empty_list_does_nothing() {
        let mut app = ready_app(Vec::new());
        assert!(press(&mut app, KeyCode::Enter).is_empty());
        assert_eq!(app.phase(), Phase::ListReady);
    }

    #[test]
    fn double_toggle_restores_focus() {
        let mut app = ready_app(vec![log("07L1")]);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus(), FocusPane::Detail);
        assert!(app.detail().is_focused());
        assert!(!app.list().is_focused());

        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus(), FocusPane::List);
        assert!(app.list().is_focused());
        assert!(!app.detail().is_focused());
    }

    #[test]
    fn toggles_and_navigation_wait_for_ready_phase() {
        let mut app = make_app(TuiConfig::default());
        app.start();
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus(), FocusPane::List);

        let generation = bootstrap(&mut app);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus(), FocusPane::List);
        assert!(press(&mut app, KeyCode::Char('r')).is_empty());

        app.handle(AppEvent::LogsLoaded { generation, result: Ok(vec![log("07L1"), log("07L2")]) });
        press(&mut app, KeyCode::Down);
        assert_eq!(app.list().selected(), Some("07L2"));
    }

    #[test]
    fn refresh_clears_list_and_ignores_stale_results() {
        let mut app = ready_app(vec![log("07L1"), log("07L2")]);
        let effects = press(&mut app, KeyCode::Char('r'));
        assert_eq!(effects, vec![Effect::FetchLogs { generation: 2 }]);
        assert!(app.list().entries().is_empty());
        assert_eq!(app.phase(), Phase::ListLoading);
        assert!(press(&mut app, KeyCode::Char('r')).is_empty());

        app.handle(AppEvent::LogsLoaded { generation: 1, result: Ok(vec![log("07Lold")]) });
        assert!(app.list().is_loading());
        assert!(app.list().entries().is_empty());

        app.handle(AppEvent::LogsLoaded { generation: 2, result: Ok(vec![log("07Lnew")]) });
        assert_eq!(app.phase(), Phase::ListReady);
        assert_eq!(app.list().selected(), Some("07Lnew"));
    }

    #[test]
    fn refresh_requires_list_focus() {
        let mut app = ready_app(vec![log("07L1")]);
        press(&mut app, KeyCode::Tab);
        assert!(press(&mut app, KeyCode::Char('r')).is_empty());
        assert_eq!(app.list().entries().len(), 1);
    }

    #[test]
    fn quit_stops_keepalive_and_discards_later_events() {
        let mut app = ready_app(vec![log(LOG_ID)]);
        press(&mut app, KeyCode::Enter);
        let effects = press(&mut app, KeyCode::Char('q'));
        assert_eq!(effects, vec![Effect::StopKeepalive]);
        assert!(app.should_quit());
        assert_eq!(app.phase(), Phase::Quitting);

        let effects = app.handle(AppEvent::BodyLoaded {
            generation: 1,
            log_id: LOG_ID.to_string(),
            result: Ok("late".to_string()),
        });
        assert!(effects.is_empty());
        assert_eq!(app.detail().content(), None);
        assert!(press(&mut app, KeyCode::Char('r')).is_empty());
        assert_eq!(app.fatal_error(), None);
    }

    #[test]
    fn ctrl_c_quits() {
        let mut app = ready_app(Vec::new());
        let effects = app.handle(AppEvent::Key(key(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert_eq!(effects, vec![Effect::StopKeepalive]);
    }

    #[test]
    fn fetch_failures_stay_inside_their_pane() {
        let mut app = make_app(TuiConfig::default());
        let generation = bootstrap(&mut app);
        app.handle(AppEvent::LogsLoaded { generation, result: Err("request returned 503".into()) });
        assert_eq!(app.phase(), Phase::ListReady);
        assert_eq!(app.list().error(), Some("request returned 503"));

        let effects = press(&mut app, KeyCode::Char('r'));
        app.handle(AppEvent::LogsLoaded { generation: 2, result: Ok(vec![log(LOG_ID)]) });
        assert_eq!(effects, vec![Effect::FetchLogs { generation: 2 }]);
        press(&mut app, KeyCode::Enter);
        app.handle(AppEvent::BodyLoaded {
            generation: 1,
            log_id: LOG_ID.to_string(),
            result: Err("request returned 404".into()),
        });
        assert_eq!(app.phase(), Phase::ListReady);
        assert_eq!(app.focus(), FocusPane::List);
        assert_eq!(app.detail().error(), Some("request returned 404"));
    }

    #[test]
    fn resize_splits_width_between_panes() {
        let app = make_app(TuiConfig::default());
        assert_eq!(app.list().area(), Rect::new(0, 0, 40, 38));
        assert_eq!(app.detail().area(), Rect::new(40, 0, 60, 38));
    }

    #[test]
    fn resize_keeps_in_flight_work() {
        let mut app = ready_app(vec![log(LOG_ID)]);
        press(&mut app, KeyCode::Enter);
        app.handle(AppEvent::Resize { width: 120, height: 30 });
        assert_eq!(app.phase(), Phase::DetailLoading);
        assert_eq!(app.list().area().width, 48);
        app.handle(AppEvent::BodyLoaded {
            generation: 1,
            log_id: LOG_ID.to_string(),
            result: Ok("body".to_string()),
        });
        assert_eq!(app.phase(), Phase::DetailReady);
    }

    #[test]
    fn filter_keys_edit_apply_and_clear() {
        let mut app = detail_app("start\nERROR one\nquiet\nERROR two");
        press(&mut app, KeyCode::Char('/'));
        assert!(app.detail().is_editing_filter());

        for ch in "ERROR q".chars() {
            press(&mut app, KeyCode::Char(ch));
        }
        assert!(!app.should_quit());
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.detail().displayed(), "ERROR one\nERROR two");
        assert!(!app.detail().is_editing_filter());

        press(&mut app, KeyCode::Esc);
        assert!(!app.detail().is_filter_open());
        assert_eq!(app.detail().displayed(), "start\nERROR one\nquiet\nERROR two");
    }

    #[test]
    fn failed_reload_does_not_leave_a_hidden_filter_editor() {
        let mut app = ready_app(vec![log("07L000000000AAA"), log(LOG_ID)]);
        let effects = press(&mut app, KeyCode::Enter);
        assert_eq!(
            effects,
            vec![Effect::FetchBody { generation: 1, log_id: "07L000000000AAA".to_string() }]
        );
        app.handle(AppEvent::BodyLoaded {
            generation: 1,
            log_id: "07L000000000AAA".to_string(),
            result: Ok("line1\nline2".to_string()),
        });
        press(&mut app, KeyCode::Char('/'));
        assert!(app.detail().is_editing_filter());

        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus(), FocusPane::List);
        press(&mut app, KeyCode::Down);
        let effects = press(&mut app, KeyCode::Enter);
        assert_eq!(effects, vec![Effect::FetchBody { generation: 2, log_id: LOG_ID.to_string() }]);
        assert!(!app.detail().is_filter_open());
        app.handle(AppEvent::BodyLoaded {
            generation: 2,
            log_id: LOG_ID.to_string(),
            result: Err("request returned 500".into()),
        });

        press(&mut app, KeyCode::Tab);
        assert_eq!(app.phase(), Phase::DetailReady);
        assert_eq!(app.detail().load_state(), PaneLoadState::Failed);
        assert!(!app.detail().is_editing_filter());

        let effects = press(&mut app, KeyCode::Char('q'));
        assert_eq!(effects, vec![Effect::StopKeepalive]);
        assert!(app.should_quit());
        assert_eq!(app.detail().input().buffer, "");
    }

    #[test]
    fn keepalive_results_update_status() {
        let mut app = ready_app(Vec::new());
        let checked_at = Utc::now();
        app.handle(AppEvent::Keepalive { checked_at, result: Err("request returned 500".into()) });
        assert_eq!(app.warning(), Some("trace flag renewal failed: request returned 500"));
        assert!(render_to_string(&mut app).contains("trace flag renewal failed"));

        app.handle(AppEvent::Keepalive { checked_at, result: Ok(TraceFlagOutcome::Renewed) });
        assert_eq!(app.warning(), None);
        assert!(render_to_string(&mut app).contains("trace flag renewed"));
    }

    #[test]
    fn help_toggle_expands_footer() {
        let mut app = ready_app(vec![log("07L1")]);
        let before = app.list().area().height;
        assert!(!render_to_string(&mut app).contains("go to bottom"));

        press(&mut app, KeyCode::Char('?'));
        assert!(app.list().area().height < before);
        assert!(render_to_string(&mut app).contains("go to bottom"));

        press(&mut app, KeyCode::Char('?'));
        assert_eq!(app.list().area().height, before);
    }

    #[test]
    fn custom_bindings_replace_defaults() {
        let mut overrides = BTreeMap::new();
        overrides.insert("refresh".to_string(), vec!["f5".to_string()]);
        let keys = KeyBindings::with_overrides(&overrides).expect("keys");
        let mut app = make_app(TuiConfig { keys, ..TuiConfig::default() });
        let generation = bootstrap(&mut app);
        app.handle(AppEvent::LogsLoaded { generation, result: Ok(vec![log("07L1")]) });

        assert!(press(&mut app, KeyCode::Char('r')).is_empty());
        assert_eq!(press(&mut app, KeyCode::F(5)), vec![Effect::FetchLogs { generation: 2 }]);
    }

    #[test]
    fn renders_both_panes_and_status() {
        let mut app = make_app(TuiConfig {
            org_label: "scratch".to_string(),
            username: "dev@example.com".to_string(),
            ..TuiConfig::default()
        });
        app.start();
        let screen = render_to_string(&mut app);
        assert!(screen.contains("preparing trace flag"));
        assert!(screen.contains("Loading apex logs..."));

        let generation = bootstrap(&mut app);
        app.handle(AppEvent::LogsLoaded { generation, result: Ok(vec![log(LOG_ID)]) });
        let screen = render_to_string(&mut app);
        assert!(screen.contains("Apex logs"));
        assert!(screen.contains(&format_start_time("2024-05-01T12:30:00.000+0000")));
        assert!(screen.contains("1 of 1"));
        assert!(screen.contains("Select an apex log to see the content"));
        assert!(screen.contains("org scratch"));
        assert!(screen.contains("dev@example.com"));
        assert!(screen.contains("trace flag created"));
    }
}
