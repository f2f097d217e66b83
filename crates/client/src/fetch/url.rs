//! URL checks and access-token handling for outgoing requests.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Query parameter carrying the session token.
pub const ACCESS_TOKEN_PARAM: &str = "accesstoken";

/// Canonicalize a URL string before it is requested.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Reject anything that is not http(s)
/// 3. Remove fragment (#...)
/// 4. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(format!("{trimmed}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Append `accesstoken=<token>` to a URL, replacing any token already present.
///
/// With no token the URL is returned canonicalized but otherwise unchanged.
pub fn with_access_token(input: &str, token: Option<&str>) -> Result<url::Url, UrlError> {
    let mut url = canonicalize(input)?;
    let Some(token) = token else {
        return Ok(url);
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != ACCESS_TOKEN_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(ACCESS_TOKEN_PARAM, token);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_basic() {
        let url = canonicalize("https://host/overlays/demo/index.json").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("host"));
    }

    #[test]
    fn test_canonicalize_remove_fragment() {
        let url = canonicalize("https://host/a#section").unwrap();
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = canonicalize("file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_canonicalize_relative_rejected() {
        assert!(matches!(canonicalize("/overlays/demo/index.json"), Err(UrlError::InvalidUrl(_))));
    }

    #[test]
    fn test_with_access_token() {
        let url = with_access_token("https://host/overlays/demo/5/3/7.png", Some("secret")).unwrap();
        assert_eq!(url.as_str(), "https://host/overlays/demo/5/3/7.png?accesstoken=secret");
    }

    #[test]
    fn test_with_access_token_replaces_existing() {
        let url = with_access_token("https://host/index.json?v=2&accesstoken=old", Some("new")).unwrap();
        assert_eq!(url.as_str(), "https://host/index.json?v=2&accesstoken=new");
    }

    #[test]
    fn test_without_token_unchanged() {
        let url = with_access_token("https://host/index.json", None).unwrap();
        assert_eq!(url.as_str(), "https://host/index.json");
    }
}
