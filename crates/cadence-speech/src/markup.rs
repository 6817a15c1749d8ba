//! Presentational markup removal before speech

use regex::Regex;
use std::sync::LazyLock;

/// Explicit pause marker, matched case-insensitively
pub static PAUSE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<pause>").expect("valid regex"));

/// Marker patterns and their replacements, applied in order
static MARKUP: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\*\*([^*]+)\*\*", "$1"),      // **bold**
        (r"\*([^*]+)\*", "$1"),          // *italic*
        (r"__([^_]+)__", "$1"),          // __bold__
        (r"_([^_]+)_", "$1"),            // _italic_
        (r"`([^`]+)`", "$1"),            // `code`
        (r"#{1,6}\s*", ""),              // headings
        (r"\[([^\]]+)\]\([^)]+\)", "$1"), // [text](url)
        (r"[*_~`]", ""),                 // stray markers
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid regex"), replacement))
    .collect()
});

/// Strip markup and pause markers, returning speakable text
pub fn strip_markup(text: &str) -> String {
    let mut out = text.to_string();
    for (pattern, replacement) in MARKUP.iter() {
        out = pattern.replace_all(&out, *replacement).into_owned();
    }
    PAUSE_TOKEN.replace_all(&out, "").trim().to_string()
}
