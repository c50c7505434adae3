//! Normalisation of free-text service replies.

use std::sync::LazyLock;

use regex::Regex;

/// Literal the scanner instruction asks for when nothing is readable.
pub const NOT_FOUND_SENTINEL: &str = "null";

const MIN_IDENTIFIER_CHARS: usize = 2;
const MIN_COMPLETION_CHARS: usize = 4;
pub const COMPLETION_COUNT: usize = 5;

static LABEL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:MRN|PID|PT|ID)\s*[:#]?\s*").expect("label regex is valid")
});

static ORDINAL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+\s*[.)]|[-*•])\s*").expect("ordinal regex is valid")
});

/// Extract an identifier from the reply to an image request.
///
/// Only the first line counts. A single leading label (`MRN`, `PID`, `PT`,
/// `ID`) is stripped with or without a separator. Returns `None` for the sentinel and for values shorter than two
/// characters, before or after stripping.
#[must_use]
pub fn parse_identifier(reply: &str) -> Option<String> {
    let reply = reply.trim();
    if reply.eq_ignore_ascii_case(NOT_FOUND_SENTINEL) || reply.chars().count() < MIN_IDENTIFIER_CHARS
    {
        return None;
    }

    let first_line = reply.lines().next().unwrap_or_default().trim();
    let value = LABEL_PREFIX.replace(first_line, "");
    let value = value.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');

    if value.eq_ignore_ascii_case(NOT_FOUND_SENTINEL) || value.chars().count() < MIN_IDENTIFIER_CHARS
    {
        return None;
    }
    Some(value.to_string())
}

/// Split a completion reply into at most five distinct suggestions.
#[must_use]
pub fn parse_completions(reply: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in reply.lines() {
        let line = ORDINAL_PREFIX.replace(line.trim(), "");
        let line = line.trim().trim_matches('"').trim();
        if line.chars().count() < MIN_COMPLETION_CHARS {
            continue;
        }
        if out.iter().any(|seen| seen.eq_ignore_ascii_case(line)) {
            continue;
        }
        out.push(line.to_string());
        if out.len() == COMPLETION_COUNT {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_label_and_keeps_first_line() {
        assert_eq!(
            parse_identifier("MRN: 123456\nextra"),
            Some("123456".to_string())
        );
    }

    #[test]
    fn label_match_is_case_insensitive() {
        assert_eq!(parse_identifier("mrn:00417"), Some("00417".to_string()));
        assert_eq!(parse_identifier("Pid #  A77-19"), Some("A77-19".to_string()));
        assert_eq!(parse_identifier("ID 8812 "), Some("8812".to_string()));
        assert_eq!(parse_identifier("pt: 9034"), Some("9034".to_string()));
    }

    #[test]
    fn strips_label_without_separator() {
        assert_eq!(parse_identifier("MRN123456"), Some("123456".to_string()));
        assert_eq!(parse_identifier("PT9034"), Some("9034".to_string()));
        assert_eq!(parse_identifier("pid00417\nextra"), Some("00417".to_string()));
    }

    #[test]
    fn sentinel_and_short_values_are_none() {
        assert_eq!(parse_identifier("null"), None);
        assert_eq!(parse_identifier("  NULL \n"), None);
        assert_eq!(parse_identifier("7"), None);
        assert_eq!(parse_identifier(""), None);
        assert_eq!(parse_identifier("MRN: 7"), None);
        assert_eq!(parse_identifier("ID: null"), None);
    }

    #[test]
    fn plain_value_passes_through() {
        assert_eq!(parse_identifier("A1B2C3"), Some("A1B2C3".to_string()));
        assert_eq!(parse_identifier("`778812`"), Some("778812".to_string()));
    }

    #[test]
    fn completions_strip_ordinals_and_bullets() {
        let reply = "1. Laparoscopic Appendectomy\n2) Open Appendectomy\n- Interval Appendectomy\n\n* Appendiceal Abscess Drainage\n• Incidental Appendectomy\n6. Extra";
        assert_eq!(
            parse_completions(reply),
            [
                "Laparoscopic Appendectomy",
                "Open Appendectomy",
                "Interval Appendectomy",
                "Appendiceal Abscess Drainage",
                "Incidental Appendectomy",
            ]
        );
    }

    #[test]
    fn completions_drop_short_and_duplicate_lines() {
        let reply = "CAB\n\"Colectomy\"\ncolectomy\n  Hemicolectomy  ";
        assert_eq!(parse_completions(reply), ["Colectomy", "Hemicolectomy"]);
    }
}
