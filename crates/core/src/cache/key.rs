//! Cache identity for tile URLs.
//!
//! Network requests carry an access token; cache keys never do. Keeping
//! ephemeral auth parameters out of the key is what lets a token rotation
//! leave existing entries valid.

use sha2::{Digest, Sha256};
use url::Url;

use crate::Error;

/// Key of `url` while it is staged in the scratch namespace for `target`.
///
/// The target rides in the fragment, which no cache key carries, so rows
/// staged for different targets never collide.
pub fn staging_key(url: &str, target: &str) -> String {
    format!("{url}#{target}")
}

/// Normalize a URL into its cache key.
///
/// Removes the fragment and every query parameter named in `ephemeral`.
/// Other query parameters are kept untouched and in order.
pub fn cache_key(url: &str, ephemeral: &[String]) -> Result<String, Error> {
    let mut parsed = Url::parse(url.trim()).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
    parsed.set_fragment(None);

    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.iter().any(|(k, _)| ephemeral.iter().any(|e| e == k)) {
        let kept: Vec<_> = pairs
            .into_iter()
            .filter(|(k, _)| !ephemeral.iter().any(|e| e == k))
            .collect();
        if kept.is_empty() {
            parsed.set_query(None);
        } else {
            parsed.query_pairs_mut().clear().extend_pairs(kept);
        }
    } else if parsed.query() == Some("") {
        parsed.set_query(None);
    }

    Ok(parsed.into())
}

/// Hex-encoded SHA-256 of a tile blob.
pub fn blob_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Vec<String> {
        vec!["accesstoken".to_string()]
    }

    #[test]
    fn test_strips_token() {
        let key = cache_key("https://host/overlays/demo/5/3/7.png?accesstoken=secret", &token()).unwrap();
        assert_eq!(key, "https://host/overlays/demo/5/3/7.png");
    }

    #[test]
    fn test_token_rotation_same_key() {
        let a = cache_key("https://host/o/1/0/0.png?accesstoken=one", &token()).unwrap();
        let b = cache_key("https://host/o/1/0/0.png?accesstoken=two", &token()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_keeps_other_params() {
        let key = cache_key("https://v.example/1/0/0.pbf?key=abc&accesstoken=t&v=2", &token()).unwrap();
        assert_eq!(key, "https://v.example/1/0/0.pbf?key=abc&v=2");

        let untouched = cache_key("https://v.example/1/0/0.pbf?key=a%2Bb", &token()).unwrap();
        assert_eq!(untouched, "https://v.example/1/0/0.pbf?key=a%2Bb");
    }

    #[test]
    fn test_removes_fragment() {
        let key = cache_key("https://host/o/1/0/0.png#frag", &token()).unwrap();
        assert_eq!(key, "https://host/o/1/0/0.png");
    }

    #[test]
    fn test_relative_rejected() {
        assert!(matches!(cache_key("/o/1/0/0.png", &token()), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_staging_key_never_a_cache_key() {
        let key = cache_key("https://host/a/5/3/7.png?accesstoken=x", &token()).unwrap();
        let staged = staging_key(&key, "overlay-a_1");
        assert_ne!(staged, key);
        assert_ne!(staged, staging_key(&key, "overlay-b_1"));
        assert_eq!(cache_key(&staged, &token()).unwrap(), key);
    }

    #[test]
    fn test_digest_format() {
        let digest = blob_digest(b"tile");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, blob_digest(b"tile"));
        assert_ne!(digest, blob_digest(b"other"));
    }
}
