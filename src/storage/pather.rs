//! Path layouts for the disk backend.
//!
//! A pather maps `(key, params)` to the path components of one entry file.
//! Splitting the hash over a few directory levels keeps per-directory file
//! counts low when there are many entries.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Maps a cache key and rendered params to relative path components.
pub type Pather = fn(key: &str, params: &str) -> Vec<String>;

pub const DEFAULT_PATHER: Pather = sha256_hex_pather;

/// `key/ab/cd/ef/<rest of hex digest>`
pub fn sha256_hex_pather(key: &str, params: &str) -> Vec<String> {
    let hash = hex::encode(Sha256::digest(params.as_bytes()));
    vec![
        key.to_string(),
        hash[0..2].to_string(),
        hash[2..4].to_string(),
        hash[4..6].to_string(),
        hash[6..].to_string(),
    ]
}

/// `key/ab/cd/<full url-safe base64 digest>`
pub fn sha256_base64_pather(key: &str, params: &str) -> Vec<String> {
    let hash = URL_SAFE.encode(Sha256::digest(params.as_bytes()));
    vec![
        key.to_string(),
        hash[0..2].to_string(),
        hash[2..4].to_string(),
        hash,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_pather_layout() {
        let parts = sha256_hex_pather("helloWorld", r#"{"age":42,"name":"Bob"}"#);
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "helloWorld");
        assert_eq!(parts[1..].concat().len(), 64);
        assert!(parts[1..].concat().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_base64_pather_layout() {
        let parts = sha256_base64_pather("helloWorld", "null");
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3].len(), 44);
        assert!(parts[3].starts_with(&format!("{}{}", parts[1], parts[2])));
        assert!(!parts[3].contains('/'));
    }

    #[test]
    fn test_pathers_are_deterministic() {
        for pather in [sha256_hex_pather as Pather, sha256_base64_pather] {
            assert_eq!(pather("k", "p"), pather("k", "p"));
            assert_ne!(pather("k", "p1"), pather("k", "p2"));
        }
    }
}
