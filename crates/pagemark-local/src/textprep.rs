//! Minimal, deterministic text normalization helpers.
//!
//! Whitespace here means what a browser regex `\s` means: Unicode `White_Space` plus the
//! byte-order mark, so text copied out of a rendered page normalizes the same way.

fn is_space(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}

/// Collapse every whitespace run to a single ASCII space and trim both ends.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for ch in s.chars() {
        if is_space(ch) {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

pub fn has_any_text(s: &str) -> bool {
    s.chars().any(|c| !is_space(c))
}
