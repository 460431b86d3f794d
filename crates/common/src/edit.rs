// In-place text editing primitives for artifact content.
//
// These are pure string transforms: the artifact store loads the current
// content, applies one of these, and writes the result back through the
// normal versioned-update path. Matching is exact (whitespace included)
// and non-overlapping, left to right.

use thiserror::Error;

/// Maximum number of matching lines enumerated in an ambiguity error.
const AMBIGUITY_CONTEXT_LINES: usize = 3;
/// Matching lines are truncated to this many characters in error context.
const AMBIGUITY_LINE_MAX_CHARS: usize = 80;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("old_string cannot be empty")]
    EmptyNeedle,
    #[error("string not found in content")]
    NoMatch,
    #[error("string appears {occurrences} times; {}", .context.join(", "))]
    AmbiguousMatch { occurrences: usize, context: Vec<String> },
    #[error("line number {line} out of range (valid range is 1..={max})")]
    LineOutOfRange { line: usize, max: usize },
}

/// Replaces up to `limit` occurrences of `old` with `new` (all when
/// `limit` is `None`). Returns the modified content and the number of
/// replacements actually made.
pub fn find_and_replace(
    content: &str,
    old: &str,
    new: &str,
    limit: Option<usize>,
) -> Result<(String, usize), EditError> {
    if old.is_empty() {
        return Err(EditError::EmptyNeedle);
    }

    let occurrences = count_occurrences(content, old);
    if occurrences == 0 {
        return Err(EditError::NoMatch);
    }

    let replacements = limit.map_or(occurrences, |limit| limit.min(occurrences));
    Ok((content.replacen(old, new, replacements), replacements))
}

/// Inserts `text` as a new line immediately before the existing line at
/// 1-based `line_number`. `line_number == total_lines + 1` appends as a
/// new final line.
pub fn insert_at_line(content: &str, line_number: usize, text: &str) -> Result<String, EditError> {
    let mut lines: Vec<&str> = content.split('\n').collect();
    let max = lines.len() + 1;

    if line_number == 0 || line_number > max {
        return Err(EditError::LineOutOfRange { line: line_number, max });
    }

    lines.insert(line_number - 1, text);
    Ok(lines.join("\n"))
}

/// Checks that `needle` occurs in `content`, and — unless
/// `allow_multiple` is set — occurs exactly once. Returns the occurrence
/// count. The ambiguity error enumerates up to three matching lines so
/// the caller can widen its anchor.
pub fn validate_unique_match(
    content: &str,
    needle: &str,
    allow_multiple: bool,
) -> Result<usize, EditError> {
    if needle.is_empty() {
        return Err(EditError::EmptyNeedle);
    }

    let occurrences = count_occurrences(content, needle);
    if occurrences == 0 {
        return Err(EditError::NoMatch);
    }
    if occurrences > 1 && !allow_multiple {
        return Err(EditError::AmbiguousMatch {
            occurrences,
            context: ambiguity_context(content, needle),
        });
    }

    Ok(occurrences)
}

fn count_occurrences(content: &str, needle: &str) -> usize {
    content.matches(needle).count()
}

fn ambiguity_context(content: &str, needle: &str) -> Vec<String> {
    let matching_lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .filter(|(_, line)| line.contains(needle))
        .map(|(index, line)| (index + 1, line))
        .collect();

    let mut context: Vec<String> = matching_lines
        .iter()
        .take(AMBIGUITY_CONTEXT_LINES)
        .map(|(number, line)| format!("line {number}: {}", truncate_chars(line, AMBIGUITY_LINE_MAX_CHARS)))
        .collect();

    if matching_lines.len() > AMBIGUITY_CONTEXT_LINES {
        context.push(format!("+{} more", matching_lines.len() - AMBIGUITY_CONTEXT_LINES));
    }

    context
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
