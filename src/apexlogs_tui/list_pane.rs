use std::fmt;

use chrono::{Local, TimeZone};
use ratatui::layout::{Constraint, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Cell, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState, Table,
    TableState, Wrap,
};
use ratatui::Frame;

use super::theme::Theme;
use super::{split_for_scrollbar, PaneLoadState};
use crate::apexlogs_api::{parse_datetime, ApexLog};
use crate::colors::status_color_name;

pub const EMPTY_MESSAGE: &str = "No logs found to display";
pub const LOADING_MESSAGE: &str = "Loading apex logs...";
const START_TIME_FORMAT: &str = "%d %b %H:%M";
const HEADERS: [&str; 4] = ["Start time", "Operation", "Status", "Log Size"];
// Borders plus the header row.
const CHROME_ROWS: u16 = 3;

/// Table of recent apex logs with a cursor.
#[derive(Debug, Default)]
pub struct ListPane {
    entries: Vec<ApexLog>,
    table: TableState,
    loading: bool,
    loaded: bool,
    focused: bool,
    error: Option<String>,
    area: Rect,
}

impl ListPane {
    pub fn new() -> Self {
        Self { focused: true, ..Self::default() }
    }

    /// Replaces the rows and puts the cursor on the first one.
    pub fn set_entries(&mut self, entries: Vec<ApexLog>) {
        let selected = if entries.is_empty() { None } else { Some(0) };
        self.entries = entries;
        self.table = TableState::default().with_selected(selected);
        self.loaded = true;
        self.error = None;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.table = TableState::default();
        self.error = None;
    }

    pub fn entries(&self) -> &[ApexLog] {
        &self.entries
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.table.selected().filter(|idx| *idx < self.entries.len())
    }

    /// Id of the row under the cursor.
    pub fn selected(&self) -> Option<&str> {
        self.selected_index().map(|idx| self.entries[idx].id.as_str())
    }

    pub fn start_loading(&mut self) {
        self.loading = true;
    }

    pub fn stop_loading(&mut self) {
        self.loading = false;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Shows `message` in place of the rows until the next successful load.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.entries.clear();
        self.table = TableState::default();
        self.error = Some(message.into());
        self.loaded = true;
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn load_state(&self) -> PaneLoadState {
        if self.loading {
            PaneLoadState::Loading
        } else if self.error.is_some() {
            PaneLoadState::Failed
        } else if !self.loaded {
            PaneLoadState::Idle
        } else if self.entries.is_empty() {
            PaneLoadState::Empty
        } else {
            PaneLoadState::Ready
        }
    }

    pub fn set_area(&mut self, area: Rect) {
        self.area = area;
    }

    pub fn area(&self) -> Rect {
        self.area
    }

    fn page_size(&self) -> usize {
        usize::from(self.area.height.saturating_sub(CHROME_ROWS)).max(1)
    }

    pub fn move_by(&mut self, delta: isize) {
        if self.entries.is_empty() {
            return;
        }
        let last = self.entries.len() as isize - 1;
        let current = self.selected_index().unwrap_or(0) as isize;
        let next = current.saturating_add(delta).clamp(0, last);
        self.table.select(Some(next as usize));
    }

    pub fn page_up(&mut self) {
        self.move_by(-(self.page_size() as isize));
    }

    pub fn page_down(&mut self) {
        self.move_by(self.page_size() as isize);
    }

    pub fn select_first(&mut self) {
        if !self.entries.is_empty() {
            self.table.select(Some(0));
        }
    }

    pub fn select_last(&mut self) {
        if let Some(last) = self.entries.len().checked_sub(1) {
            self.table.select(Some(last));
        }
    }

    pub fn render(&mut self, frame: &mut Frame<'_>, area: Rect, theme: &Theme, spinner: &str) {
        self.area = area;
        let total = self.entries.len();
        let pos = self.selected_index().map_or(0, |idx| idx + 1);
        let block = Block::default()
            .borders(Borders::ALL)
            .title(Line::from(" Apex logs "))
            .title_bottom(Line::from(format!("─ {pos} of {total} ─")).right_aligned())
            .border_style(theme.panel_border_style(self.focused))
            .title_style(theme.panel_title_style(self.focused));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let header = Row::new(HEADERS).style(theme.header_style());
        let widths =
            [Constraint::Length(12), Constraint::Fill(2), Constraint::Fill(1), Constraint::Length(9)];

        let message = match self.load_state() {
            PaneLoadState::Loading => Some(Line::from(format!("{spinner} {LOADING_MESSAGE}"))),
            PaneLoadState::Empty | PaneLoadState::Idle => {
                Some(Line::styled(EMPTY_MESSAGE, theme.dimmed_style()))
            }
            PaneLoadState::Failed => {
                Some(Line::styled(self.error.clone().unwrap_or_default(), theme.error_style()))
            }
            PaneLoadState::Ready => None,
        };
        if let Some(message) = message {
            frame.render_widget(Table::new(Vec::<Row>::new(), widths).header(header), inner);
            let body = Rect {
                y: inner.y.saturating_add(1),
                height: inner.height.saturating_sub(1),
                ..inner
            };
            frame.render_widget(Paragraph::new(message).wrap(Wrap { trim: false }), body);
            return;
        }

        let rows = self.entries.iter().map(|entry| {
            let status = match status_color_name(&entry.status).and_then(|c| theme.color_from_name(c)) {
                Some(color) => Span::styled(entry.status.clone(), theme.base_style().fg(color)),
                None => Span::raw(entry.status.clone()),
            };
            Row::new([
                Cell::from(format_start_time(&entry.start_time)),
                Cell::from(entry.operation.clone()),
                Cell::from(status),
                Cell::from(format_size(entry.log_length)),
            ])
        });
        let table = Table::new(rows, widths)
            .header(header)
            .style(theme.base_style())
            .row_highlight_style(theme.selection_style(self.focused));

        let (table_area, scrollbar_area) = split_for_scrollbar(inner);
        frame.render_stateful_widget(table, table_area, &mut self.table);

        if let Some(scrollbar_area) = scrollbar_area {
            let viewport_len = usize::from(table_area.height.saturating_sub(1));
            if total > viewport_len && viewport_len > 0 {
                let thumb_style = if self.focused {
                    theme.panel_border_style(true)
                } else {
                    theme.dimmed_style()
                };
                let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                    .thumb_style(thumb_style)
                    .track_style(theme.dimmed_style());
                let scroll_len = total.saturating_sub(viewport_len).saturating_add(1);
                let mut scrollbar_state = ScrollbarState::new(scroll_len)
                    .position(self.table.offset())
                    .viewport_content_length(viewport_len);
                let track = Rect {
                    y: scrollbar_area.y.saturating_add(1),
                    height: scrollbar_area.height.saturating_sub(1),
                    ..scrollbar_area
                };
                frame.render_stateful_widget(scrollbar, track, &mut scrollbar_state);
            }
        }
    }
}

/// `LogLength` in whole kilobytes, switching to megabytes above 999 KB.
pub fn format_size(bytes: u64) -> String {
    let kb = bytes / 1024;
    if kb > 999 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{kb} KB")
    }
}

/// `StartTime` as `02 Jan 15:04` in local time, or the raw value when it does not parse.
pub fn format_start_time(raw: &str) -> String {
    format_start_time_in(raw, &Local)
}

pub fn format_start_time_in<Tz>(raw: &str, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    parse_datetime(raw)
        .map(|start| start.with_timezone(tz).format(START_TIME_FORMAT).to_string())
        .unwrap_or_else(|_| raw.to_string())
}
