use std::borrow::Cow;

use unicode_width::UnicodeWidthChar;

const TAB_WIDTH: usize = 4;

/// Makes one log line safe to draw in the terminal.
///
/// Escape sequences are removed, tabs are expanded to display-column stops and remaining
/// control characters are dropped. Lines that need none of that are returned borrowed.
pub fn sanitize_line(line: &str) -> Cow<'_, str> {
    if !line.chars().any(|ch| ch.is_control()) {
        return Cow::Borrowed(line);
    }
    let stripped = strip_escape_sequences(line);
    let mut out = String::with_capacity(stripped.len());
    let mut column = 0usize;
    for ch in stripped.chars() {
        match ch {
            '\t' => {
                let pad = TAB_WIDTH - column % TAB_WIDTH;
                out.extend(std::iter::repeat(' ').take(pad));
                column += pad;
            }
            _ if ch.is_control() => {}
            _ => {
                out.push(ch);
                column += ch.width().unwrap_or(0);
            }
        }
    }
    Cow::Owned(out)
}

/// Removes CSI (`ESC [ ... final`) and OSC (`ESC ] ... BEL|ST`) sequences.
fn strip_escape_sequences(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\u{1b}' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            Some('[') => {
                chars.next();
                for next in chars.by_ref() {
                    if ('@'..='~').contains(&next) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                while let Some(next) = chars.next() {
                    if next == '\u{7}' {
                        break;
                    }
                    if next == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            Some(_) => {
                chars.next();
            }
            None => {}
        }
    }
    out
}
