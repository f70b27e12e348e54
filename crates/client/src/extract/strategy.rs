//! Main-content location strategies.
//!
//! Strategies run in order; the first whose acceptance predicate holds wins.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Elements whose text never counts as content.
const SKIPPED_TAGS: &[&str] =
    &["script", "style", "nav", "header", "footer", "aside", "noscript", "template", "iframe"];

/// Classes of boilerplate blocks found inside article containers.
const JUNK_CLASSES: &[&str] = &["ad", "social-share", "recommended"];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "pre", "table", "tr", "td", "th", "figure", "figcaption", "dd", "dt",
];

const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    ".article-body",
    ".article-content",
    ".story-content",
    ".post-content",
    ".entry-content",
    "[itemprop=\"articleBody\"]",
    "#article-content",
];

/// Minimum length for a content-container match to be trusted.
pub const MIN_CONTAINER_CHARS: usize = 200;

/// Minimum number of paragraphs for a block to count as prose.
const MIN_PARAGRAPHS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Longest match among well-known article containers.
    ContentSelectors,
    /// Longest `div`/`section` holding several paragraphs.
    ParagraphBlocks,
    /// Everything under `body`.
    WholeDocument,
}

impl ExtractionStrategy {
    pub const ORDER: [ExtractionStrategy; 3] =
        [ExtractionStrategy::ContentSelectors, ExtractionStrategy::ParagraphBlocks, ExtractionStrategy::WholeDocument];

    /// Whether text found by this strategy is good enough to stop.
    pub fn accepts(&self, text: &str) -> bool {
        match self {
            ExtractionStrategy::ContentSelectors => text.chars().count() >= MIN_CONTAINER_CHARS,
            ExtractionStrategy::ParagraphBlocks => !text.is_empty(),
            ExtractionStrategy::WholeDocument => true,
        }
    }

    /// Run this strategy, returning whitespace-collapsed text if anything matched.
    pub fn locate(&self, document: &Html, selectors: &StrategySelectors) -> Option<String> {
        match self {
            ExtractionStrategy::ContentSelectors => selectors
                .containers
                .iter()
                .flat_map(|sel| document.select(sel))
                .map(|el| element_text(el, true))
                .max_by_key(|t| t.chars().count()),
            ExtractionStrategy::ParagraphBlocks => document
                .select(&selectors.blocks)
                .filter(|el| el.select(&selectors.paragraph).count() >= MIN_PARAGRAPHS)
                .map(|el| element_text(el, false))
                .max_by_key(|t| t.chars().count()),
            ExtractionStrategy::WholeDocument => {
                let root = document.select(&selectors.body).next().unwrap_or_else(|| document.root_element());
                Some(element_text(root, false))
            }
        }
    }
}

/// Compiled selectors shared by all strategies.
#[derive(Debug, Clone)]
pub struct StrategySelectors {
    containers: Vec<Selector>,
    blocks: Selector,
    paragraph: Selector,
    body: Selector,
}

impl StrategySelectors {
    pub fn new() -> Result<Self, String> {
        let containers = CONTENT_SELECTORS
            .iter()
            .map(|css| parse_selector(css))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            containers,
            blocks: parse_selector("div, section")?,
            paragraph: parse_selector("p")?,
            body: parse_selector("body")?,
        })
    }
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("invalid selector {css:?}: {e}"))
}

/// Visible text of `element` with whitespace collapsed.
///
/// Skips non-content tags; with `strip_junk` also skips ad and share blocks.
pub fn element_text(element: ElementRef<'_>, strip_junk: bool) -> String {
    let mut raw = String::new();
    collect_text(element, strip_junk, &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(element: ElementRef<'_>, strip_junk: bool, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                if strip_junk && el.classes().any(|c| JUNK_CLASSES.contains(&c)) {
                    continue;
                }
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push(' ');
                }
                collect_text(child_ref, strip_junk, out);
                if block {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}
