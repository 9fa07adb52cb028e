//! Content normalization, hashing, and summaries.

use sha2::{Digest, Sha256};

/// Trim and collapse every whitespace run to a single space.
pub fn normalize_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 hex digest of the normalized content.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(normalize_content(content).as_bytes()))
}

/// Summary shown by index search: the normalized content cut to `max_chars`.
pub fn summarize(content: &str, max_chars: usize) -> String {
    let normalized = normalize_content(content);
    if normalized.chars().count() <= max_chars {
        return normalized;
    }
    let cut: String = normalized.chars().take(max_chars).collect();
    // Prefer a word boundary when one is close to the limit.
    match cut.rfind(' ') {
        Some(index) if index >= max_chars / 2 => cut[..index].to_string(),
        _ => cut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn whitespace_variants_hash_identically() {
        assert_eq!(normalize_content("  AAPL \n price\tis  187 "), "AAPL price is 187");
        assert_eq!(
            content_hash("AAPL price is 187"),
            content_hash(" AAPL  price is\n187")
        );
        assert_ne!(content_hash("AAPL price is 187"), content_hash("AAPL price is 188"));
    }

    #[test]
    fn summary_respects_limit() {
        assert_eq!(summarize("short note", 200), "short note");
        assert_eq!(summarize("alpha beta gamma delta", 12), "alpha beta");
        assert_eq!(summarize("abcdefghij", 4), "abcd");
        assert!(summarize(&"word ".repeat(100), 50).chars().count() <= 50);
    }
}
