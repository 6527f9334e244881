use ratatui::style::{Color, Modifier, Style};

/// Styles shared by the panes. Sticks to the 16 ANSI colors so it follows the terminal theme.
#[derive(Debug, Clone, Copy, Default)]
pub struct Theme;

impl Theme {
    pub fn base_style(&self) -> Style {
        Style::default()
    }

    pub fn color_from_name(&self, value: &str) -> Option<Color> {
        match value.trim().to_ascii_lowercase().as_str() {
            "red" => Some(Color::Red),
            "green" => Some(Color::Green),
            "yellow" | "orange" => Some(Color::Yellow),
            "blue" => Some(Color::Blue),
            "gray" | "grey" => Some(Color::DarkGray),
            _ => None,
        }
    }

    pub fn panel_border_style(&self, focused: bool) -> Style {
        if focused {
            self.base_style().fg(Color::Green)
        } else {
            self.base_style()
        }
    }

    pub fn panel_title_style(&self, focused: bool) -> Style {
        if focused {
            self.base_style().fg(Color::Green).add_modifier(Modifier::BOLD)
        } else {
            self.base_style().add_modifier(Modifier::BOLD)
        }
    }

    pub fn selection_style(&self, focused: bool) -> Style {
        if focused {
            self.base_style().add_modifier(Modifier::REVERSED | Modifier::BOLD)
        } else {
            self.base_style().add_modifier(Modifier::REVERSED)
        }
    }

    pub fn header_style(&self) -> Style {
        self.base_style().add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
    }

    pub fn help_key_style(&self) -> Style {
        self.base_style().fg(Color::LightBlue).add_modifier(Modifier::BOLD)
    }

    pub fn dimmed_style(&self) -> Style {
        self.base_style().fg(Color::DarkGray)
    }

    pub fn error_style(&self) -> Style {
        self.base_style().fg(Color::Red)
    }

    pub fn warning_style(&self) -> Style {
        self.base_style().fg(Color::Yellow)
    }

    pub fn match_style(&self) -> Style {
        self.base_style().fg(Color::Black).bg(Color::Yellow)
    }
}
