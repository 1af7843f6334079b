//! Internal helpers for name normalization.
//!
//! Account and category names are stored twice: the display form as the user
//! typed it (whitespace-collapsed) and a normalized key used for per-user
//! uniqueness.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::{EngineError, ResultEngine};

/// Collapse inner whitespace and trim; reject empty names.
pub(crate) fn normalize_display(input: &str, label: &str) -> ResultEngine<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidName(format!(
            "{label} name must not be empty"
        )));
    }
    let mut out = String::new();
    for token in trimmed.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
    }
    Ok(out)
}

/// Lowercased, accent-stripped uniqueness key for a display name.
pub(crate) fn normalize_key(input: &str, label: &str) -> ResultEngine<String> {
    let mut out = String::new();
    let mut prev_space = false;
    for ch in input.trim().nfkd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            prev_space = false;
        } else if !out.is_empty() && !prev_space {
            out.push(' ');
            prev_space = true;
        }
    }
    let normalized = out.trim();
    if normalized.is_empty() {
        return Err(EngineError::InvalidName(format!(
            "{label} name must contain at least one alphanumeric character"
        )));
    }
    Ok(normalized.to_string())
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}
