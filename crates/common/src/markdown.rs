// Heading-based title extraction and search snippets for markdown content.

use crate::types::TITLE_MAX_CHARS;

/// Snippet length used by list/search previews.
pub const SNIPPET_MAX_CHARS: usize = 200;

/// Derives a title from markdown content.
///
/// Priority: first `#` heading anywhere in the text, then first `##`
/// heading, then first non-empty line, then the cleaned content itself
/// (reachable only when the content is all whitespace). The heading scan
/// is line-anchored, so an H1 later in the document still wins over an
/// earlier H2.
pub fn extract_title(content: &str) -> String {
    extract_title_with_limit(content, TITLE_MAX_CHARS)
}

pub fn extract_title_with_limit(content: &str, max_chars: usize) -> String {
    if content.is_empty() {
        return "Untitled".to_owned();
    }

    let cleaned = content.trim();

    if let Some(heading) = first_heading(cleaned, 1) {
        return truncate_chars(heading, max_chars);
    }
    if let Some(heading) = first_heading(cleaned, 2) {
        return truncate_chars(heading, max_chars);
    }

    if let Some(line) = cleaned.lines().map(str::trim).find(|line| !line.is_empty()) {
        return truncate_chars(line, max_chars);
    }

    truncate_chars(cleaned, max_chars)
}

/// Generates a preview snippet: trimmed content, truncated with an
/// ellipsis when it exceeds the limit.
pub fn snippet(content: &str) -> String {
    snippet_with_limit(content, SNIPPET_MAX_CHARS)
}

pub fn snippet_with_limit(content: &str, max_chars: usize) -> String {
    let cleaned = content.trim();
    if cleaned.chars().count() <= max_chars {
        return cleaned.to_owned();
    }
    format!("{}...", truncate_chars(cleaned, max_chars))
}

/// Returns the text of the first line that is a heading of exactly
/// `level` (`#` count), or `None`.
fn first_heading(content: &str, level: usize) -> Option<&str> {
    content.lines().find_map(|line| heading_text(line, level))
}

fn heading_text(line: &str, level: usize) -> Option<&str> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes != level {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(|c: char| c.is_whitespace()) {
        return None;
    }
    let text = rest.trim();
    (!text.is_empty()).then_some(text)
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
