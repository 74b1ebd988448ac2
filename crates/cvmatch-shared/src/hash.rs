use sha1::{Digest, Sha1};

/// Canonical form used before fingerprinting: CRLF folded to LF, outer
/// whitespace trimmed.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_string()
}

// Lowercase hex SHA-1 of the normalized text. Must stay byte-compatible with
// fingerprints already stored in exported images.
pub fn content_hash(text: &str) -> String {
    let normalized = normalize_text(text);
    let mut hasher = Sha1::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CONTENT_HASH_HEX_LEN;

    #[test]
    fn test_known_vectors() {
        assert_eq!(content_hash("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(content_hash(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_line_endings_ignored() {
        let unix = "Jane Doe\nRust engineer\n5 years";
        let windows = "Jane Doe\r\nRust engineer\r\n5 years";
        assert_eq!(content_hash(unix), content_hash(windows));
    }

    #[test]
    fn test_outer_whitespace_ignored() {
        assert_eq!(content_hash("  resume body \n\n"), content_hash("resume body"));
        assert_eq!(content_hash("\r\n\tresume body\r\n"), content_hash("resume body"));
    }

    #[test]
    fn test_inner_whitespace_significant() {
        assert_ne!(content_hash("resume  body"), content_hash("resume body"));
    }

    #[test]
    fn test_lone_carriage_return_kept() {
        assert_eq!(normalize_text("a\rb"), "a\rb");
        assert_ne!(content_hash("a\rb"), content_hash("a\nb"));
    }

    #[test]
    fn test_digest_length() {
        let hash = content_hash("Backend Engineer");
        assert_eq!(hash.len(), CONTENT_HASH_HEX_LEN);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
