//! URL canonicalization for consistent fetching and safety checks.

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a caller-supplied URL.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Allow only http and https
/// 4. Lowercase the host
/// 5. Remove fragment (#...)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    let host = parsed.host_str().map(str::to_lowercase).ok_or(UrlError::MissingHost)?;
    parsed
        .set_host(Some(&host))
        .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Host of `url` without a leading `www.`.
pub fn display_domain(url: &url::Url) -> String {
    let host = url.host_str().unwrap_or_default();
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("example.com/news").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/news");
    }

    #[test]
    fn test_canonicalize_lowercase_host_and_fragment() {
        let url = canonicalize("  https://NEWS.Example.COM/a?b=1#top ").unwrap();
        assert_eq!(url.as_str(), "https://news.example.com/a?b=1");
    }

    #[test]
    fn test_canonicalize_http_allowed() {
        assert_eq!(canonicalize("http://example.com").unwrap().scheme(), "http");
    }

    #[test]
    fn test_canonicalize_rejects_other_schemes() {
        assert!(matches!(canonicalize("file:///etc/passwd"), Err(UrlError::UnsupportedScheme(_))));
        assert!(matches!(canonicalize("ftp://example.com"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_canonicalize_invalid() {
        assert!(matches!(canonicalize("https://exa mple.com"), Err(UrlError::InvalidUrl(_))));
    }

    #[test]
    fn test_display_domain_strips_www() {
        let url = canonicalize("https://www.example.org/story").unwrap();
        assert_eq!(display_domain(&url), "example.org");

        let url = canonicalize("https://blog.example.org").unwrap();
        assert_eq!(display_domain(&url), "blog.example.org");
    }
}
