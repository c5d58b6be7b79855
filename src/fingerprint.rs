use sha2::{Digest, Sha256};

/// Content identity of a record: hex SHA-256 of `title` followed directly by
/// `abstract_text`. Used verbatim as the index document id.
pub fn fingerprint(title: &str, abstract_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(abstract_text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(fingerprint("T1", "x"), fingerprint("T1", "x"));
        assert_eq!(fingerprint("T1", "x").len(), 64);
    }

    #[test]
    fn test_concatenation_without_separator() {
        assert_eq!(fingerprint("T1", "x"), fingerprint("T1x", ""));
        assert_eq!(fingerprint("T1", "x"), fingerprint("T", "1x"));
    }

    #[test]
    fn test_distinct_pairs() {
        assert_ne!(fingerprint("T1", "x"), fingerprint("T1", "y"));
        assert_ne!(fingerprint("T1", "x"), fingerprint("T2", "x"));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            fingerprint("", ""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
