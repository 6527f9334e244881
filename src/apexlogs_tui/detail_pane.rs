use memchr::memmem;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use super::theme::Theme;
use super::PaneLoadState;
use crate::sanitize::sanitize_line;

pub const EMPTY_MESSAGE: &str = "Select an apex log to see the content";
pub const LOADING_MESSAGE: &str = "Loading selected apex log...";
const FILTER_PLACEHOLDER: &str = "Search apex log...";
const FILTER_BOX_HEIGHT: u16 = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputState {
    pub buffer: String,
    pub cursor: usize,
}

impl InputState {
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    pub fn insert_char(&mut self, ch: char) {
        self.buffer.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    pub fn backspace(&mut self) {
        if let Some(ch) = self.buffer[..self.cursor].chars().next_back() {
            self.cursor -= ch.len_utf8();
            self.buffer.remove(self.cursor);
        }
    }
}

/// Body of the selected log, with an optional line filter.
#[derive(Debug, Default)]
pub struct DetailPane {
    log_id: Option<String>,
    content: Option<String>,
    filtered: Option<String>,
    filter: Option<String>,
    input: InputState,
    filter_open: bool,
    editing: bool,
    loading: bool,
    focused: bool,
    error: Option<String>,
    scroll: u16,
    area: Rect,
}

impl DetailPane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shows a freshly fetched body. Any previous filter is dropped.
    pub fn set_content(&mut self, log_id: impl Into<String>, content: String) {
        self.log_id = Some(log_id.into());
        self.content = Some(content);
        self.filtered = None;
        self.filter = None;
        self.reset_filter_box();
        self.error = None;
        self.scroll = 0;
    }

    pub fn log_id(&self) -> Option<&str> {
        self.log_id.as_deref()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// What the viewport currently shows.
    pub fn displayed(&self) -> &str {
        self.filtered.as_deref().or(self.content.as_deref()).unwrap_or("")
    }

    /// Keeps only lines containing `needle` literally. An empty needle clears the filter.
    pub fn apply_filter(&mut self, needle: &str) {
        if needle.is_empty() {
            self.clear_filter();
            return;
        }
        self.filtered = self.content.as_deref().map(|content| filter_lines(content, needle));
        self.filter = Some(needle.to_string());
        self.scroll = 0;
    }

    pub fn clear_filter(&mut self) {
        self.filtered = None;
        self.filter = None;
        self.scroll = 0;
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn open_filter(&mut self) {
        self.filter_open = true;
        self.editing = true;
    }

    /// Applies what was typed and hands keys back to scrolling.
    pub fn submit_filter(&mut self) {
        let needle = self.input.buffer.clone();
        self.apply_filter(&needle);
        self.editing = false;
    }

    pub fn close_filter(&mut self) {
        self.filter_open = false;
        self.editing = false;
        self.input.clear();
        self.clear_filter();
    }

    pub fn is_filter_open(&self) -> bool {
        self.filter_open
    }

    /// True only while the input box is on screen and has the keys.
    pub fn is_editing_filter(&self) -> bool {
        self.focused && self.editing && self.load_state() == PaneLoadState::Ready
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn input_char(&mut self, ch: char) {
        self.input.insert_char(ch);
    }

    pub fn input_backspace(&mut self) {
        self.input.backspace();
    }

    /// The filter box belongs to the body being replaced, so it closes here.
    pub fn start_loading(&mut self) {
        self.loading = true;
        self.reset_filter_box();
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

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.log_id = None;
        self.content = None;
        self.filtered = None;
        self.filter = None;
        self.scroll = 0;
        self.reset_filter_box();
        self.error = Some(message.into());
    }

    fn reset_filter_box(&mut self) {
        self.filter_open = false;
        self.editing = false;
        self.input.clear();
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn load_state(&self) -> PaneLoadState {
        if self.loading {
            return PaneLoadState::Loading;
        }
        if self.error.is_some() {
            return PaneLoadState::Failed;
        }
        match self.content.as_deref() {
            None => PaneLoadState::Idle,
            Some("") => PaneLoadState::Empty,
            Some(_) => PaneLoadState::Ready,
        }
    }

    pub fn set_area(&mut self, area: Rect) {
        self.area = area;
    }

    pub fn area(&self) -> Rect {
        self.area
    }

    pub fn scroll(&self) -> u16 {
        self.scroll
    }

    fn viewport_height(&self) -> u16 {
        let box_height = if self.filter_open { FILTER_BOX_HEIGHT } else { 0 };
        self.area.height.saturating_sub(2).saturating_sub(box_height)
    }

    fn max_scroll(&self) -> u16 {
        let lines = self.displayed().split('\n').count();
        let max = lines.saturating_sub(usize::from(self.viewport_height()));
        u16::try_from(max).unwrap_or(u16::MAX)
    }

    pub fn scroll_by(&mut self, delta: i32) {
        let next = i32::from(self.scroll).saturating_add(delta).max(0);
        let next = u16::try_from(next).unwrap_or(u16::MAX);
        self.scroll = next.min(self.max_scroll());
    }

    pub fn page_up(&mut self) {
        self.scroll_by(-i32::from(self.viewport_height().max(1)));
    }

    pub fn page_down(&mut self) {
        self.scroll_by(i32::from(self.viewport_height().max(1)));
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = self.max_scroll();
    }

    pub fn render(&mut self, frame: &mut Frame<'_>, area: Rect, theme: &Theme, spinner: &str) {
        self.area = area;
        let (view_area, input_area) = if self.filter_open && self.load_state() == PaneLoadState::Ready
        {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0), Constraint::Length(FILTER_BOX_HEIGHT)])
                .split(area);
            (chunks[0], Some(chunks[1]))
        } else {
            (area, None)
        };

        let title = match &self.log_id {
            Some(id) => Line::from(vec![Span::raw(" Log "), Span::styled(id.clone(), theme.dimmed_style()), Span::raw(" ")]),
            None => Line::from(" Log "),
        };
        let mut block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(theme.panel_border_style(self.focused && !self.is_editing_filter()))
            .title_style(theme.panel_title_style(self.focused));

        let placeholder = match self.load_state() {
            PaneLoadState::Loading => Some(Line::from(format!("{spinner} {LOADING_MESSAGE}"))),
            PaneLoadState::Idle | PaneLoadState::Empty => {
                Some(Line::styled(EMPTY_MESSAGE, theme.dimmed_style()))
            }
            PaneLoadState::Failed => {
                Some(Line::styled(self.error.clone().unwrap_or_default(), theme.error_style()))
            }
            PaneLoadState::Ready => None,
        };
        if let Some(placeholder) = placeholder {
            let inner = block.inner(view_area);
            frame.render_widget(block, view_area);
            let top = inner.y + inner.height.saturating_sub(1) / 2;
            let centered = Rect { y: top, height: inner.height.saturating_sub(top - inner.y), ..inner };
            frame.render_widget(
                Paragraph::new(placeholder).alignment(Alignment::Center).wrap(Wrap { trim: true }),
                centered,
            );
            return;
        }

        let total = self.content.as_deref().map_or(0, |content| content.split('\n').count());
        let bottom = match &self.filter {
            Some(_) => {
                let shown = if self.displayed().is_empty() { 0 } else { self.displayed().split('\n').count() };
                format!("─ {shown} of {total} lines ─")
            }
            None => format!("─ {total} lines ─"),
        };
        block = block.title_bottom(Line::from(bottom).right_aligned());

        self.scroll = self.scroll.min(self.max_scroll());
        let finder = self.filter.as_deref().map(memmem::Finder::new);
        let text: Text<'static> = self
            .displayed()
            .split('\n')
            .map(|line| highlight_line(&sanitize_line(line), finder.as_ref(), theme))
            .collect::<Vec<_>>()
            .into();
        let paragraph =
            Paragraph::new(text).block(block).scroll((self.scroll, 0)).style(theme.base_style());
        frame.render_widget(paragraph, view_area);

        if let Some(input_area) = input_area {
            let editing = self.is_editing_filter();
            let input_block = Block::default()
                .borders(Borders::ALL)
                .border_style(theme.panel_border_style(editing));
            let line = if self.input.buffer.is_empty() && editing {
                Line::styled(FILTER_PLACEHOLDER, theme.dimmed_style())
            } else if editing {
                Line::from(vec![
                    Span::raw(self.input.buffer.clone()),
                    Span::styled(" ", theme.selection_style(true)),
                ])
            } else {
                Line::from(self.input.buffer.clone())
            };
            frame.render_widget(Paragraph::new(line).block(input_block), input_area);
        }
    }
}

/// Lines of `content` containing `needle`, in order, joined by `\n`.
pub fn filter_lines(content: &str, needle: &str) -> String {
    let finder = memmem::Finder::new(needle.as_bytes());
    content
        .split('\n')
        .filter(|line| finder.find(line.as_bytes()).is_some())
        .collect::<Vec<_>>()
        .join("\n")
}

fn highlight_line(line: &str, finder: Option<&memmem::Finder<'_>>, theme: &Theme) -> Line<'static> {
    let Some(finder) = finder else {
        return Line::from(line.to_string());
    };
    let needle_len = finder.needle().len();
    if needle_len == 0 {
        return Line::from(line.to_string());
    }
    let mut spans = Vec::new();
    let mut cursor = 0usize;
    for start in finder.find_iter(line.as_bytes()) {
        if start < cursor {
            continue;
        }
        let end = start + needle_len;
        if !line.is_char_boundary(start) || !line.is_char_boundary(end) {
            continue;
        }
        if start > cursor {
            spans.push(Span::raw(line[cursor..start].to_string()));
        }
        spans.push(Span::styled(line[start..end].to_string(), theme.match_style()));
        cursor = end;
    }
    if cursor < line.len() {
        spans.push(Span::raw(line[cursor..].to_string()));
    }
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    const BODY: &str = "61.0 APEX_CODE,FINEST\n\
12:00:00.1|USER_DEBUG|[1]|DEBUG|start\n\
12:00:00.2|EXCEPTION_THROWN|[5]|ERROR boom\n\
12:00:00.3|USER_DEBUG|[9]|DEBUG|end\n\
12:00:00.4|FATAL_ERROR|ERROR again";

    fn render_to_string(pane: &mut DetailPane, width: u16, height: u16) -> String {
        let backend = TestBackend::new(width, height);
        let mut terminal = Terminal::new(backend).expect("terminal");
        terminal
            .draw(|frame| {
                let area = frame.area();
                pane.render(frame, area, &Theme, "*");
            })
            .expect("draw");
        let buffer = terminal.backend().buffer();
        buffer.content().iter().map(|cell| cell.symbol()).collect()
    }

    #[test]
    fn filter_keeps_matching_lines_in_order() {
        let mut pane = DetailPane::new();
        pane.set_content("07L000000000ABC", BODY.to_string());
        pane.apply_filter("ERROR");
        assert_eq!(
            pane.displayed(),
            "12:00:00.2|EXCEPTION_THROWN|[5]|ERROR boom\n12:00:00.4|FATAL_ERROR|ERROR again"
        );
        assert_eq!(pane.filter(), Some("ERROR"));
    }

    #[test]
    fn clearing_filter_restores_exact_content() {
        let mut pane = DetailPane::new();
        pane.set_content("07L000000000ABC", BODY.to_string());
        pane.apply_filter("USER_DEBUG");
        pane.apply_filter("nothing matches this");
        assert_eq!(pane.displayed(), "");
        pane.clear_filter();
        assert_eq!(pane.displayed(), BODY);
    }

    #[test]
    fn filter_is_case_sensitive_and_literal() {
        assert_eq!(filter_lines("a.b\naxb\nA.B", "a.b"), "a.b");
        assert_eq!(filter_lines("error\nERROR", "ERROR"), "ERROR");
    }

    #[test]
    fn empty_needle_clears_filter() {
        let mut pane = DetailPane::new();
        pane.set_content("07L1", BODY.to_string());
        pane.apply_filter("DEBUG");
        pane.apply_filter("");
        assert_eq!(pane.filter(), None);
        assert_eq!(pane.displayed(), BODY);
    }

    #[test]
    fn new_content_drops_previous_filter() {
        let mut pane = DetailPane::new();
        pane.set_content("07L1", BODY.to_string());
        pane.apply_filter("ERROR");
        pane.set_content("07L2", "line one\nline two".to_string());
        assert_eq!(pane.filter(), None);
        assert_eq!(pane.displayed(), "line one\nline two");
        assert_eq!(pane.log_id(), Some("07L2"));
    }

    #[test]
    fn load_states() {
        let mut pane = DetailPane::new();
        assert_eq!(pane.load_state(), PaneLoadState::Idle);
        pane.start_loading();
        assert_eq!(pane.load_state(), PaneLoadState::Loading);
        pane.stop_loading();
        pane.set_content("07L1", String::new());
        assert_eq!(pane.load_state(), PaneLoadState::Empty);
        pane.set_content("07L1", "x".to_string());
        assert_eq!(pane.load_state(), PaneLoadState::Ready);
        pane.set_error("request returned 404: not found");
        assert_eq!(pane.load_state(), PaneLoadState::Failed);
        assert_eq!(pane.content(), None);
    }

    #[test]
    fn filter_box_editing_flow() {
        let mut pane = DetailPane::new();
        pane.focus();
        pane.set_content("07L1", BODY.to_string());
        pane.open_filter();
        assert!(pane.is_editing_filter());
        for ch in "ERRORx".chars() {
            pane.input_char(ch);
        }
        pane.input_backspace();
        assert_eq!(pane.input().buffer, "ERROR");
        pane.submit_filter();
        assert!(!pane.is_editing_filter());
        assert!(pane.is_filter_open());
        assert_eq!(pane.displayed().lines().count(), 2);

        pane.close_filter();
        assert!(!pane.is_filter_open());
        assert_eq!(pane.input().buffer, "");
        assert_eq!(pane.displayed(), BODY);
    }

    #[test]
    fn reload_and_errors_close_the_filter_box() {
        let mut pane = DetailPane::new();
        pane.focus();
        pane.set_content("07L1", BODY.to_string());
        pane.open_filter();
        pane.input_char('E');

        pane.start_loading();
        assert!(!pane.is_filter_open());
        assert!(!pane.is_editing_filter());
        assert_eq!(pane.input().buffer, "");

        pane.stop_loading();
        pane.set_content("07L2", BODY.to_string());
        pane.open_filter();
        pane.input_char('E');
        pane.set_error("request returned 500");
        assert!(!pane.is_filter_open());
        assert!(!pane.is_editing_filter());
        assert_eq!(pane.input().buffer, "");
    }

    #[test]
    fn editing_needs_a_visible_body() {
        let mut pane = DetailPane::new();
        pane.focus();
        pane.open_filter();
        assert!(!pane.is_editing_filter());
        pane.set_content("07L1", "x".to_string());
        pane.open_filter();
        assert!(pane.is_editing_filter());
        pane.blur();
        assert!(!pane.is_editing_filter());
    }

    #[test]
    fn input_backspace_handles_multibyte_chars() {
        let mut input = InputState::default();
        input.insert_char('é');
        input.insert_char('x');
        input.backspace();
        input.backspace();
        input.backspace();
        assert_eq!(input, InputState::default());
    }

    #[test]
    fn scrolling_is_clamped_to_content() {
        let mut pane = DetailPane::new();
        let body = (0..50).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        pane.set_content("07L1", body);
        pane.set_area(Rect::new(0, 0, 60, 12));
        pane.scroll_by(-5);
        assert_eq!(pane.scroll(), 0);
        pane.page_down();
        assert_eq!(pane.scroll(), 10);
        pane.scroll_to_bottom();
        assert_eq!(pane.scroll(), 40);
        pane.scroll_by(100);
        assert_eq!(pane.scroll(), 40);
        pane.scroll_to_top();
        assert_eq!(pane.scroll(), 0);
    }

    #[test]
    fn renders_placeholder_loading_and_content() {
        let mut pane = DetailPane::new();
        let screen = render_to_string(&mut pane, 60, 10);
        assert!(screen.contains(EMPTY_MESSAGE));

        pane.start_loading();
        let screen = render_to_string(&mut pane, 60, 10);
        assert!(screen.contains(LOADING_MESSAGE));

        pane.stop_loading();
        pane.set_content("07L000000000ABC", "first\r\nsecond\tcol".to_string());
        let screen = render_to_string(&mut pane, 60, 10);
        assert!(screen.contains("07L000000000ABC"));
        assert!(screen.contains("first"));
        assert!(screen.contains("second  col"));
        assert!(screen.contains("2 lines"));
    }

    #[test]
    fn renders_filter_box_and_match_count() {
        let mut pane = DetailPane::new();
        pane.focus();
        pane.set_content("07L1", BODY.to_string());
        pane.open_filter();
        let screen = render_to_string(&mut pane, 80, 14);
        assert!(screen.contains(FILTER_PLACEHOLDER));

        for ch in "ERROR".chars() {
            pane.input_char(ch);
        }
        pane.submit_filter();
        let screen = render_to_string(&mut pane, 80, 14);
        assert!(screen.contains("2 of 5 lines"));
        assert!(!screen.contains("USER_DEBUG"));
    }
}
