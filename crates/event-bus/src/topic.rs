//! AMQP topic-exchange routing rules.
//!
//! Routing keys and binding patterns are dot-separated words. In a pattern
//! `*` matches exactly one word and `#` matches zero or more words.

use crate::{BusError, Result};

/// Returns true if `routing_key` is routed to a binding with `pattern`.
pub fn pattern_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    words_match(&pattern, &key)
}

fn words_match(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.first(), key.first()) {
        (None, None) => true,
        (Some(&"#"), _) => {
            words_match(&pattern[1..], key) || (!key.is_empty() && words_match(pattern, &key[1..]))
        }
        (Some(&"*"), Some(_)) => words_match(&pattern[1..], &key[1..]),
        (Some(word), Some(key_word)) if word == key_word => words_match(&pattern[1..], &key[1..]),
        _ => false,
    }
}

/// Rejects empty patterns, empty words and wildcards mixed into a word.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(BusError::InvalidPattern("pattern is empty".to_string()));
    }

    for word in pattern.split('.') {
        if word.is_empty() {
            return Err(BusError::InvalidPattern(format!(
                "empty word in pattern '{pattern}'"
            )));
        }
        if word.len() > 1 && (word.contains('*') || word.contains('#')) {
            return Err(BusError::InvalidPattern(format!(
                "wildcard must be a whole word in pattern '{pattern}'"
            )));
        }
    }

    Ok(())
}
