/*!
 * Cleanup of raw engine output.
 *
 * Chat models like to wrap answers in `<json>` tags or markdown code fences
 * and occasionally emit stray control characters. `clean_llm_output`
 * removes all three before the text reaches a ticket.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// `<json> ... </json>` wrapper
static JSON_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*<json>\s*(.*?)\s*</json>\s*$").unwrap()
});

/// Markdown code fence with an optional info string
static CODE_FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)\r?\n?```\s*$").unwrap()
});

/// Strip wrappers and control characters from engine output.
///
/// Tab, line feed and carriage return are kept; every other character in
/// `U+0000..=U+001F` and `U+007F` is removed.
pub fn clean_llm_output(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(inner) = JSON_TAG_REGEX.captures(text).and_then(|c| c.get(1)) {
        text = inner.as_str();
    }
    if let Some(inner) = CODE_FENCE_REGEX.captures(text).and_then(|c| c.get(1)) {
        text = inner.as_str();
    }

    strip_control_chars(text.trim())
}

/// Remove ASCII control characters except `\t`, `\n` and `\r`
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| matches!(c, '\t' | '\n' | '\r') || !c.is_ascii_control())
        .collect()
}

/// Shorten text for log lines, respecting char boundaries
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
