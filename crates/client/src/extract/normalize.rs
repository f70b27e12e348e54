//! Post-processing of located article text.

use regex::Regex;

/// Longest article body kept, in characters.
pub const MAX_BODY_CHARS: usize = 5000;

/// Strips share widgets and "read more" tails from extracted text.
#[derive(Debug, Clone)]
pub struct TextCleaner {
    boilerplate_tail: Regex,
}

impl TextCleaner {
    pub fn new() -> Result<Self, regex::Error> {
        let boilerplate_tail = Regex::new(r"(?is)(share on (twitter|facebook|linkedin)|read more).*$")?;
        Ok(Self { boilerplate_tail })
    }

    /// Collapse whitespace, drop boilerplate tails, trim and bound the text.
    pub fn clean(&self, raw: &str, max_chars: usize) -> String {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let stripped = self.boilerplate_tail.replace(&collapsed, "");
        truncate_chars(stripped.trim(), max_chars).to_string()
    }
}

/// Prefix the body with its byline: `"{title}. By {author}. {body}"`.
pub fn with_byline(title: &str, author: &str, body: &str) -> String {
    format!("{title}. By {author}. {body}")
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
