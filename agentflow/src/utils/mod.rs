//! Identifier and timestamp helpers.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents a UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Generates a compact entity id (32 upper-case hex characters, no dashes).
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

/// Generates a time-ordered correlation id.
#[must_use]
pub fn generate_correlation_id() -> String {
    Uuid::now_v7().to_string()
}

/// Returns the current UTC time as an ISO 8601 string.
///
/// ```
/// use agentflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.ends_with('Z'));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Truncates text to at most `max_chars` characters, returning whether it was cut.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_format() {
        let id = generate_id();
        assert_eq!(id.len(), 32);
        assert!(!id.contains('-'));
        assert_ne!(id, generate_id());
    }

    #[test]
    fn test_iso_timestamp_parses() {
        let ts = iso_timestamp();
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), ("hello".to_string(), false));
        assert_eq!(truncate_chars("hello", 3), ("hel".to_string(), true));
        assert_eq!(truncate_chars("héllo", 2), ("hé".to_string(), true));
    }
}
