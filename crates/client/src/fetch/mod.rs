//! HTTP fetch pipeline with SSRF protection.
//!
//! ### URL Canonicalization
//! - Trim whitespace, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### SSRF & Safety Gates
//! - Deny private ranges (RFC1918, link-local, localhost, etc.)
//! - Resolve DNS and validate all A/AAAA answers are public.
//! - Redirect hops to IP-literal private hosts are refused.
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//!
//! ### Body handling
//! - Only HTML, XML and plain-text responses are read.
//! - The body is read in chunks and abandoned once it passes the cap.
//! - Bytes that are not valid UTF-8 are replaced, never rejected.

pub mod ssrf;
pub mod url;

use bytes::{Bytes, BytesMut};
use reqwest::Url;
use reqwest::{Client, header};
use std::time::{Duration, Instant};

pub use ssrf::{SsrfError, check_literal_host, check_resolved, validate_ip};
pub use url::{UrlError, canonicalize, display_domain};

use verity_core::{AppConfig, Error};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string; a desktop browser UA by default.
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 10s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Whether to refuse private and reserved addresses (default: true)
    pub block_private_addresses: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.fetch_timeout(),
            max_redirects: 5,
            block_private_addresses: config.block_private_addresses,
        }
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The canonical URL requested
    pub url: Url,
    /// The final URL after redirects
    pub final_url: Url,
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl FetchResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// HTTP fetch client with safety checks.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let max_redirects = config.max_redirects;
        let block_private = config.block_private_addresses;

        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= max_redirects {
                return attempt.error(format!("more than {max_redirects} redirects"));
            }
            if block_private && let Err(e) = check_literal_host(attempt.url()) {
                return attempt.error(e);
            }
            attempt.follow()
        });

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(redirect)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Fetch a URL, returning raw bytes and metadata.
    ///
    /// Performs the SSRF check and enforces redirect, type and byte limits.
    pub async fn fetch(&self, url_str: &str) -> Result<FetchResponse, Error> {
        let start = Instant::now();
        let url = canonicalize(url_str).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        if self.config.block_private_addresses {
            check_resolved(&url).await.map_err(|e| Error::SsrfBlocked(e.to_string()))?;
        }

        let mut response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, ACCEPT_HTML)
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();

        if !status.is_success() {
            return Err(Error::HttpError(format!("status {}", status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if let Some(ct) = &content_type
            && !is_readable_content_type(ct)
        {
            return Err(Error::UnsupportedContent(ct.clone()));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().clone();

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_send_error(&e))? {
            if body.len() + chunk.len() > self.config.max_bytes {
                return Err(Error::FetchTooLarge(format!("body exceeds {} bytes", self.config.max_bytes)));
            }
            body.extend_from_slice(&chunk);
        }
        let bytes = body.freeze();

        let fetch_ms = start.elapsed().as_millis() as u64;

        Ok(FetchResponse { url, final_url, bytes, fetch_ms })
    }

    fn map_send_error(&self, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::FetchTimeout(format!("no response within {}ms", self.config.timeout.as_millis()))
        } else if e.is_redirect() {
            Error::SsrfBlocked(format!("redirect refused: {e}"))
        } else {
            Error::HttpError(format!("network error: {e}"))
        }
    }
}

/// Whether a `Content-Type` names a document the extractor can read.
pub fn is_readable_content_type(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    mime.is_empty() || mime.starts_with("text/") || mime.contains("html") || mime.ends_with("xml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert!(config.user_agent.contains("Mozilla"));
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(10000));
        assert_eq!(config.max_redirects, 5);
        assert!(config.block_private_addresses);
    }

    #[test]
    fn test_readable_content_types() {
        assert!(is_readable_content_type("text/html; charset=utf-8"));
        assert!(is_readable_content_type("application/xhtml+xml"));
        assert!(is_readable_content_type("application/xml"));
        assert!(is_readable_content_type("text/plain"));
        assert!(!is_readable_content_type("application/pdf"));
        assert!(!is_readable_content_type("image/png"));
        assert!(!is_readable_content_type("application/json"));
    }

    #[test]
    fn test_text_is_lossy() {
        let response = FetchResponse {
            url: Url::parse("https://example.com").unwrap(),
            final_url: Url::parse("https://example.com/redirected").unwrap(),
            bytes: Bytes::from_static(b"caf\xe9 ok"),
            fetch_ms: 100,
        };

        assert_eq!(response.text(), "caf\u{fffd} ok");
    }

    #[tokio::test]
    async fn test_fetch_rejects_private_target() {
        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let err = client.fetch("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, Error::SsrfBlocked(_)));
    }

    #[tokio::test]
    async fn test_fetch_rejects_bad_scheme() {
        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let err = client.fetch("ftp://example.com/file").await.unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }
}
