//! Length/shape checks for opaque text supplied by external collaborators.

const ELLIPSIS: &str = "...";

/// Truncate to at most `max_chars` characters (not bytes), marking the cut
/// with `...`. Caps too small to hold the marker cut without it.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= ELLIPSIS.len() {
        return text.chars().take(max_chars).collect();
    }
    let keep = max_chars - ELLIPSIS.len();
    format!("{}{ELLIPSIS}", text.chars().take(keep).collect::<String>())
}

/// Trimmed copy, or `None` when nothing but whitespace remains.
pub fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
