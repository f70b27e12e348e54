//! Page metadata: title, author and publication date.

use super::strategy::{element_text, parse_selector};
use scraper::{Html, Selector};

pub const UNKNOWN_AUTHOR: &str = "Unknown Source";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageMetadata {
    pub title: String,
    pub author: String,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MetadataSelectors {
    title: Selector,
    og_title: Selector,
    h1: Selector,
    meta_author: Selector,
    author_class: Selector,
    published: Vec<Selector>,
}

impl MetadataSelectors {
    pub fn new() -> Result<Self, String> {
        Ok(Self {
            title: parse_selector("title")?,
            og_title: parse_selector("meta[property=\"og:title\"]")?,
            h1: parse_selector("h1")?,
            meta_author: parse_selector("meta[name=\"author\"]")?,
            author_class: parse_selector(".author")?,
            published: vec![
                parse_selector("meta[property=\"article:published_time\"]")?,
                parse_selector("meta[name=\"publish-date\"]")?,
            ],
        })
    }

    /// Read metadata with the usual fallbacks.
    ///
    /// Title: `<title>`, `og:title`, first `h1`. Author: `meta[name=author]`,
    /// first `.author`, then [`UNKNOWN_AUTHOR`].
    pub fn read(&self, document: &Html) -> PageMetadata {
        let title = first_text(document, &self.title)
            .or_else(|| meta_content(document, &self.og_title))
            .or_else(|| first_text(document, &self.h1))
            .unwrap_or_default();

        let author = meta_content(document, &self.meta_author)
            .or_else(|| first_text(document, &self.author_class))
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

        let published_at = self.published.iter().find_map(|sel| meta_content(document, sel));

        PageMetadata { title, author, published_at }
    }
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|el| element_text(el, false))
        .filter(|t| !t.is_empty())
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .find_map(|el| el.value().attr("content"))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(html: &str) -> PageMetadata {
        MetadataSelectors::new().unwrap().read(&Html::parse_document(html))
    }

    #[test]
    fn test_full_metadata() {
        let meta = read(
            r#"<html><head><title> Council passes budget </title>
            <meta name="author" content="Ana Ruiz">
            <meta property="article:published_time" content="2024-05-01T08:00:00Z">
            </head><body><h1>Heading</h1></body></html>"#,
        );
        assert_eq!(meta.title, "Council passes budget");
        assert_eq!(meta.author, "Ana Ruiz");
        assert_eq!(meta.published_at.as_deref(), Some("2024-05-01T08:00:00Z"));
    }

    #[test]
    fn test_title_fallbacks() {
        let meta = read(r#"<html><head><meta property="og:title" content="From OG"></head><body></body></html>"#);
        assert_eq!(meta.title, "From OG");

        let meta = read("<html><body><h1>From H1</h1><h1>Second</h1></body></html>");
        assert_eq!(meta.title, "From H1");
    }

    #[test]
    fn test_author_fallbacks() {
        let meta = read(r#"<html><body><span class="author"> Lee Park </span></body></html>"#);
        assert_eq!(meta.author, "Lee Park");

        let meta = read("<html><body><p>no byline</p></body></html>");
        assert_eq!(meta.author, UNKNOWN_AUTHOR);
        assert!(meta.title.is_empty());
        assert!(meta.published_at.is_none());
    }

    #[test]
    fn test_publish_date_meta_name() {
        let meta = read(r#"<html><head><meta name="publish-date" content="2024-01-02"></head></html>"#);
        assert_eq!(meta.published_at.as_deref(), Some("2024-01-02"));
    }
}
