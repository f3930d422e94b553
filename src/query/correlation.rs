//! Correlation-ID-expiry handler (spec §4.G): distinguishes the server's
//! "your cursor is gone" signal from a genuine error.

use once_cell::sync::Lazy;
use regex::RegexSet;

const PATTERNS: [&str; 7] = [
    "invalid correlation id",
    "correlation id.*not found",
    "correlation id.*invalid",
    "bad request",
    "no transaction is active",
    "cursor.*closed",
    "query.*expired",
];

static EXPIRY_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    let patterns = PATTERNS.iter().map(|p| format!("(?i){p}"));
    RegexSet::new(patterns).expect("correlation-expiry patterns are valid regexes")
});

/// True when `message` matches one of the fixed correlation-expiry patterns
/// (spec §4.G), meaning a `fetch_more` failure should be treated as a
/// clean end-of-stream rather than a raised error.
pub fn is_correlation_expired(message: &str) -> bool {
    EXPIRY_PATTERNS.is_match(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_invalid_correlation_id() {
        assert!(is_correlation_expired("Invalid correlation ID"));
    }

    #[test]
    fn matches_correlation_id_not_found_with_infix_text() {
        assert!(is_correlation_expired("correlation id abc123 not found on server"));
    }

    #[test]
    fn matches_cursor_closed() {
        assert!(is_correlation_expired("Cursor has been closed"));
    }

    #[test]
    fn matches_query_expired() {
        assert!(is_correlation_expired("Query abc123 expired on the server"));
    }

    #[test]
    fn does_not_match_unrelated_errors() {
        assert!(!is_correlation_expired("*FILE not found."));
        assert!(!is_correlation_expired("Constraint Error on insert"));
    }
}
