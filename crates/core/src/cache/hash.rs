//! Content-addressed cache key generation.

use sha2::{Digest, Sha256};

/// Compute the content address (hex SHA-256) for a raw cache key.
pub fn content_address(raw_key: &str) -> String {
    hex::encode(Sha256::digest(raw_key.as_bytes()))
}

/// Prefix a key with a namespace tag so unrelated callers never share entries.
pub fn namespaced_key(namespace: &str, key: &str) -> String {
    format!("{namespace}:{key}")
}

/// Short form of a content address for log fields.
pub(crate) fn short(address: &str) -> &str {
    address.get(..12).unwrap_or(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = content_address("svg:@startuml\nA -> B\n@enduml");
        let hash2 = content_address("svg:@startuml\nA -> B\n@enduml");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_known_vector() {
        assert_eq!(content_address("abc"), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn test_hash_format() {
        let hash = content_address(&"x".repeat(10_000));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_namespaces_separate_keys() {
        let img = content_address(&namespaced_key("img", "A -> B"));
        let svg = content_address(&namespaced_key("svg", "A -> B"));
        assert_ne!(img, svg);
        assert_eq!(namespaced_key("svg", "A -> B"), "svg:A -> B");
    }

    #[test]
    fn test_short() {
        let hash = content_address("abc");
        assert_eq!(short(&hash), "ba7816bf8f01");
        assert_eq!(short("abc"), "abc");
    }
}
