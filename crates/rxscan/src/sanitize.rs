//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Prescriptions are health data: spans carry job ids, never owner ids or
//! full blob keys.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Returns only the last `/`-separated component of a blob key.
pub fn redact_key(key: &str) -> String {
    match key.rsplit('/').next() {
        Some(last) if !last.is_empty() => last.to_string(),
        _ => "<unknown>".to_string(),
    }
}

/// Returns a short deterministic hash of an owner identifier for log
/// correlation without exposing the identifier itself.
pub fn hash_owner(owner: &str) -> String {
    let mut hasher = DefaultHasher::new();
    owner.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_key_returns_last_component() {
        assert_eq!(
            redact_key("prescriptions/abc/job-1/img-1/original.jpg"),
            "original.jpg"
        );
    }

    #[test]
    fn test_redact_key_without_separator() {
        assert_eq!(redact_key("original.png"), "original.png");
    }

    #[test]
    fn test_redact_key_trailing_separator() {
        assert_eq!(redact_key("prescriptions/"), "<unknown>");
    }

    #[test]
    fn test_hash_owner_deterministic() {
        let h1 = hash_owner("user-42");
        let h2 = hash_owner("user-42");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
    }

    #[test]
    fn test_hash_owner_different_owners_differ() {
        assert_ne!(hash_owner("user-1"), hash_owner("user-2"));
    }
}
