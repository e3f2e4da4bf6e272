//! UTF-8 safe string helpers.
//!
//! Email bodies routinely carry multibyte characters; nothing here slices by
//! byte index.

/// Return the first `n` characters of `s` as a `String` (no ellipsis).
pub fn prefix_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Return a preview of `s` up to `n` characters, with a trailing `...` when
/// anything was cut.
pub fn preview(s: &str, n: usize) -> String {
    let mut prefix = prefix_chars(s, n);
    if s.chars().nth(n).is_some() {
        prefix.push_str("...");
    }
    prefix
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn squash_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
