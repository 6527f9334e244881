//! Key bindings, built once and handed to the app.

use std::collections::BTreeMap;
use std::fmt;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Everything a key can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Command {
    Quit,
    Select,
    ToggleFocus,
    ToggleHelp,
    Refresh,
    OpenFilter,
    ApplyFilter,
    CloseFilter,
    Up,
    Down,
    PageUp,
    PageDown,
    Top,
    Bottom,
}

impl Command {
    pub const ALL: [Command; 14] = [
        Command::Quit,
        Command::Select,
        Command::ToggleFocus,
        Command::ToggleHelp,
        Command::Refresh,
        Command::OpenFilter,
        Command::ApplyFilter,
        Command::CloseFilter,
        Command::Up,
        Command::Down,
        Command::PageUp,
        Command::PageDown,
        Command::Top,
        Command::Bottom,
    ];

    /// Name used in the config file.
    pub fn name(self) -> &'static str {
        match self {
            Self::Quit => "quit",
            Self::Select => "select",
            Self::ToggleFocus => "focus",
            Self::ToggleHelp => "help",
            Self::Refresh => "refresh",
            Self::OpenFilter => "filter",
            Self::ApplyFilter => "apply_filter",
            Self::CloseFilter => "close_filter",
            Self::Up => "up",
            Self::Down => "down",
            Self::PageUp => "page_up",
            Self::PageDown => "page_down",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Quit => "quit",
            Self::Select => "open selected apex log",
            Self::ToggleFocus => "switch focus",
            Self::ToggleHelp => "toggle help",
            Self::Refresh => "refresh apex logs",
            Self::OpenFilter => "open filter box",
            Self::ApplyFilter => "filter apex log",
            Self::CloseFilter => "close filter box",
            Self::Up => "up",
            Self::Down => "down",
            Self::PageUp => "page up",
            Self::PageDown => "page down",
            Self::Top => "go to top",
            Self::Bottom => "go to bottom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    #[error("empty key binding")]
    Empty,
    #[error("unknown key `{0}`")]
    UnknownKey(String),
    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
}

/// A single key chord such as `ctrl+c` or `G`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBinding {
    code: KeyCode,
    modifiers: KeyModifiers,
}

impl KeyBinding {
    pub fn parse(value: &str) -> Result<Self, KeyParseError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(KeyParseError::Empty);
        }
        let (prefix, key) = match value.rfind('+') {
            Some(idx) if idx + 1 < value.len() => (&value[..idx], &value[idx + 1..]),
            _ => ("", value),
        };

        let mut modifiers = KeyModifiers::NONE;
        for part in prefix.split('+').filter(|part| !part.is_empty()) {
            modifiers |= match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => KeyModifiers::CONTROL,
                "alt" | "meta" => KeyModifiers::ALT,
                "shift" => KeyModifiers::SHIFT,
                other => return Err(KeyParseError::UnknownModifier(other.to_string())),
            };
        }

        let code = parse_key_code(key)?;
        Ok(Self { code, modifiers })
    }

    pub fn matches(&self, key: &KeyEvent) -> bool {
        if key.code != self.code {
            return false;
        }
        // Terminals disagree on whether shifted characters carry SHIFT.
        let relevant = |modifiers: KeyModifiers| match self.code {
            KeyCode::Char(_) => modifiers - KeyModifiers::SHIFT,
            _ => modifiers,
        };
        relevant(key.modifiers) == relevant(self.modifiers)
    }
}

fn parse_key_code(key: &str) -> Result<KeyCode, KeyParseError> {
    let mut chars = key.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        return Ok(KeyCode::Char(ch));
    }
    let code = match key.to_ascii_lowercase().as_str() {
        "enter" | "return" => KeyCode::Enter,
        "esc" | "escape" => KeyCode::Esc,
        "tab" => KeyCode::Tab,
        "backtab" => KeyCode::BackTab,
        "space" => KeyCode::Char(' '),
        "backspace" => KeyCode::Backspace,
        "delete" | "del" => KeyCode::Delete,
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "pgup" | "pageup" => KeyCode::PageUp,
        "pgdown" | "pagedown" => KeyCode::PageDown,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        other => match other.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            Some(n) if (1..=12).contains(&n) => KeyCode::F(n),
            _ => return Err(KeyParseError::UnknownKey(key.to_string())),
        },
    };
    Ok(code)
}

impl fmt::Display for KeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.contains(KeyModifiers::CONTROL) {
            f.write_str("ctrl+")?;
        }
        if self.modifiers.contains(KeyModifiers::ALT) {
            f.write_str("alt+")?;
        }
        if self.modifiers.contains(KeyModifiers::SHIFT) {
            f.write_str("shift+")?;
        }
        match self.code {
            KeyCode::Char(' ') => f.write_str("space"),
            KeyCode::Char(ch) => write!(f, "{ch}"),
            KeyCode::Enter => f.write_str("enter"),
            KeyCode::Esc => f.write_str("esc"),
            KeyCode::Tab => f.write_str("tab"),
            KeyCode::BackTab => f.write_str("backtab"),
            KeyCode::Backspace => f.write_str("backspace"),
            KeyCode::Delete => f.write_str("del"),
            KeyCode::Up => f.write_str("↑"),
            KeyCode::Down => f.write_str("↓"),
            KeyCode::Left => f.write_str("←"),
            KeyCode::Right => f.write_str("→"),
            KeyCode::PageUp => f.write_str("pgup"),
            KeyCode::PageDown => f.write_str("pgdown"),
            KeyCode::Home => f.write_str("home"),
            KeyCode::End => f.write_str("end"),
            KeyCode::F(n) => write!(f, "f{n}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindings {
    bindings: BTreeMap<Command, Vec<KeyBinding>>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        let defaults: [(Command, &[&str]); 14] = [
            (Command::Quit, &["q", "ctrl+c"]),
            (Command::Select, &["enter"]),
            (Command::ToggleFocus, &["tab"]),
            (Command::ToggleHelp, &["?"]),
            (Command::Refresh, &["r"]),
            (Command::OpenFilter, &["/"]),
            (Command::ApplyFilter, &["enter"]),
            (Command::CloseFilter, &["esc"]),
            (Command::Up, &["up", "k"]),
            (Command::Down, &["down", "j"]),
            (Command::PageUp, &["pgup", "b"]),
            (Command::PageDown, &["pgdown", "f"]),
            (Command::Top, &["home", "g"]),
            (Command::Bottom, &["end", "G"]),
        ];
        let bindings = defaults
            .into_iter()
            .map(|(command, keys)| {
                let keys = keys
                    .iter()
                    .filter_map(|key| KeyBinding::parse(key).ok())
                    .collect::<Vec<_>>();
                (command, keys)
            })
            .collect();
        Self { bindings }
    }
}

impl KeyBindings {
    /// Defaults with the given commands rebound, keyed by [`Command::name`].
    pub fn with_overrides(overrides: &BTreeMap<String, Vec<String>>) -> Result<Self, KeyParseError> {
        let mut keys = Self::default();
        for (name, values) in overrides {
            let command = Command::from_name(name)
                .ok_or_else(|| KeyParseError::UnknownCommand(name.clone()))?;
            let parsed = values
                .iter()
                .map(|value| KeyBinding::parse(value))
                .collect::<Result<Vec<_>, _>>()?;
            keys.bindings.insert(command, parsed);
        }
        Ok(keys)
    }

    pub fn matches(&self, command: Command, key: &KeyEvent) -> bool {
        self.bindings
            .get(&command)
            .is_some_and(|bindings| bindings.iter().any(|binding| binding.matches(key)))
    }

    /// First of `candidates` bound to `key`.
    pub fn resolve(&self, key: &KeyEvent, candidates: &[Command]) -> Option<Command> {
        candidates.iter().copied().find(|command| self.matches(*command, key))
    }

    /// Short label for help lines, e.g. `q/ctrl+c`.
    pub fn label(&self, command: Command) -> String {
        self.bindings
            .get(&command)
            .map(|bindings| {
                bindings.iter().map(ToString::to_string).collect::<Vec<_>>().join("/")
            })
            .unwrap_or_default()
    }
}
