//! Readable article extraction using scraper.
//!
//! ### Main content
//! - Ordered strategies (see [`ExtractionStrategy`]): well-known article
//!   containers, then paragraph-heavy blocks, then the whole body.
//! - Navigation, scripts and page chrome never count as content.
//!
//! ### Stable Abstraction
//! - [`Extractor`] turns HTML into text; [`ContentSource`] turns a URL into an
//!   [`ExtractionResult`]. The pipeline only sees the latter.
//!
//! ### Output
//! - Whitespace collapsed, share/read-more tails removed, body bounded to
//!   5000 characters and prefixed with `"{title}. By {author}. "`.

pub mod metadata;
pub mod normalize;
pub mod strategy;

pub use metadata::{PageMetadata, UNKNOWN_AUTHOR};
pub use normalize::{MAX_BODY_CHARS, TextCleaner, truncate_chars, with_byline};
pub use strategy::ExtractionStrategy;

use crate::fetch::{FetchClient, display_domain};
use async_trait::async_trait;
use metadata::MetadataSelectors;
use scraper::Html;
use serde::{Deserialize, Serialize};
use strategy::StrategySelectors;
use verity_core::Error;

/// Article text and metadata pulled from one HTML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    pub title: String,
    pub author: String,
    pub published_at: Option<String>,
    /// Cleaned body prefixed with its byline.
    pub text: String,
    pub strategy: ExtractionStrategy,
}

/// Outcome of extracting a URL. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub url: String,
    pub title: String,
    #[serde(rename = "text")]
    pub body_text: String,
    pub domain: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ExtractionStrategy>,
}

impl ExtractionResult {
    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            body_text: String::new(),
            domain: String::new(),
            success: false,
            error: Some(error.into()),
            author: None,
            published_at: None,
            strategy: None,
        }
    }

    fn succeeded(url: &str, domain: String, content: ExtractedContent) -> Self {
        Self {
            url: url.to_string(),
            title: content.title,
            body_text: content.text,
            domain,
            success: true,
            error: None,
            author: Some(content.author),
            published_at: content.published_at,
            strategy: Some(content.strategy),
        }
    }
}

/// Stable extractor trait for content extraction.
pub trait Extractor: Send + Sync {
    /// Extract readable article text from HTML.
    fn extract(&self, html: &str) -> Result<ExtractedContent, Error>;
}

/// Scraper-based extractor implementation.
#[derive(Debug, Clone)]
pub struct ScraperExtractor {
    strategies: StrategySelectors,
    metadata: MetadataSelectors,
    cleaner: TextCleaner,
}

impl ScraperExtractor {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            strategies: StrategySelectors::new().map_err(Error::Internal)?,
            metadata: MetadataSelectors::new().map_err(Error::Internal)?,
            cleaner: TextCleaner::new().map_err(|e| Error::Internal(e.to_string()))?,
        })
    }
}

impl Extractor for ScraperExtractor {
    fn extract(&self, html: &str) -> Result<ExtractedContent, Error> {
        let document = Html::parse_document(html);
        let meta = self.metadata.read(&document);

        let (strategy, raw) = ExtractionStrategy::ORDER
            .iter()
            .find_map(|strategy| {
                strategy
                    .locate(&document, &self.strategies)
                    .filter(|text| strategy.accepts(text))
                    .map(|text| (*strategy, text))
            })
            .unwrap_or((ExtractionStrategy::WholeDocument, String::new()));

        let body = self.cleaner.clean(&raw, MAX_BODY_CHARS);
        if body.is_empty() {
            return Err(Error::ExtractFailed("page has no readable text".to_string()));
        }

        tracing::debug!(?strategy, chars = body.chars().count(), "extracted article text");

        Ok(ExtractedContent {
            text: with_byline(&meta.title, &meta.author, &body),
            title: meta.title,
            author: meta.author,
            published_at: meta.published_at,
            strategy,
        })
    }
}

/// Anything that can turn a URL into article text.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch and extract `url`. Never fails; see [`ExtractionResult::success`].
    async fn extract_url(&self, url: &str) -> ExtractionResult;
}

/// Fetches pages over HTTP and extracts them.
pub struct PageExtractor {
    fetch: FetchClient,
    extractor: Box<dyn Extractor>,
}

impl PageExtractor {
    pub fn new(fetch: FetchClient, extractor: Box<dyn Extractor>) -> Self {
        Self { fetch, extractor }
    }
}

#[async_trait]
impl ContentSource for PageExtractor {
    async fn extract_url(&self, url: &str) -> ExtractionResult {
        let response = match self.fetch.fetch(url).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url, error = %e, "fetch failed");
                return ExtractionResult::failed(url, e.to_string());
            }
        };

        tracing::debug!(
            url,
            final_url = %response.final_url,
            fetch_ms = response.fetch_ms,
            bytes = response.bytes.len(),
            "fetched page"
        );

        let html = response.text();
        match self.extractor.extract(&html) {
            Ok(content) => ExtractionResult::succeeded(url, display_domain(&response.url), content),
            Err(e) => {
                tracing::warn!(url, error = %e, "extraction failed");
                ExtractionResult::failed(url, e.to_string())
            }
        }
    }
}
