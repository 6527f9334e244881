//! Canonical color names for apex log statuses.
//!
//! The API reports free-form status strings (`Success`, `Assertion Failed`, the text of an
//! uncaught exception, ...). We only distinguish a small set of tones.

/// Color name for an `ApexLog.Status` value.
///
/// Returns `None` for statuses that should use the default foreground.
pub fn status_color_name(status: &str) -> Option<&'static str> {
    let normalized = status.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return None;
    }
    if normalized == "success" {
        return Some("green");
    }
    if normalized.contains("skipped") || normalized.contains("limit") {
        return Some("yellow");
    }
    if ["fail", "error", "exception", "fatal"].iter().any(|word| normalized.contains(word)) {
        return Some("red");
    }
    None
}
