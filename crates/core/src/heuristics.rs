//! Deterministic text signals.
//!
//! Cheap lexical scores reported next to the model verdict. Each returns a
//! value in 0..=100 where higher means more of the measured trait.

const CLICKBAIT_PHRASES: &[&str] = &[
    "you won't believe",
    "what happens next",
    "doctors hate",
    "this one trick",
    "will blow your mind",
    "mind-blowing",
    "gone wrong",
    "must see",
    "the truth about",
    "they don't want you to know",
    "share before",
    "shocking",
    "exposed",
    "miracle",
];

const EMOTIONAL_WORDS: &[&str] = &[
    "outrage",
    "outrageous",
    "horrifying",
    "terrifying",
    "disgusting",
    "furious",
    "devastating",
    "unbelievable",
    "incredible",
    "shocking",
    "evil",
    "disaster",
    "catastrophe",
    "scandal",
    "panic",
    "hate",
    "destroy",
    "destroyed",
    "betrayal",
];

const LOADED_WORDS: &[&str] = &[
    "always",
    "never",
    "everyone",
    "nobody",
    "totally",
    "completely",
    "undeniable",
    "undeniably",
    "obviously",
    "proof",
    "elites",
    "regime",
    "corrupt",
    "cover-up",
    "mainstream media",
    "wake up",
];

/// Lowercased text plus its word tokens.
struct Tokens {
    lower: String,
    words: Vec<String>,
    original_words: usize,
    shouted_words: usize,
}

impl Tokens {
    fn new(text: &str) -> Self {
        let lower = text.to_lowercase();
        let words = split_words(&lower).map(String::from).collect();

        let mut original_words = 0;
        let mut shouted_words = 0;
        for word in split_words(text) {
            original_words += 1;
            let letters = word.chars().filter(|c| c.is_alphabetic()).count();
            if letters >= 3 && word.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase) {
                shouted_words += 1;
            }
        }

        Self { lower, words, original_words, shouted_words }
    }

    fn count(&self, terms: &[&str]) -> usize {
        terms
            .iter()
            .map(|term| {
                if term.contains(' ') || term.contains('\'') {
                    self.lower.matches(term).count()
                } else {
                    self.words.iter().filter(|w| w.as_str() == *term).count()
                }
            })
            .sum()
    }

    /// Hits per hundred words.
    fn density(&self, hits: usize) -> f64 {
        if self.words.is_empty() { 0.0 } else { hits as f64 * 100.0 / self.words.len() as f64 }
    }
}

fn split_words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
}

fn to_score(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

/// Headline-style manipulation: stock phrases, exclamation runs, shouting.
pub fn clickbait_score(text: &str) -> u8 {
    let tokens = Tokens::new(text);
    if tokens.original_words == 0 {
        return 0;
    }

    let phrases = tokens.count(CLICKBAIT_PHRASES) as f64;
    let exclamations = text.matches('!').count().min(5) as f64;
    let shouting = tokens.shouted_words as f64 / tokens.original_words as f64;

    to_score(phrases * 25.0 + exclamations * 6.0 + shouting * 200.0)
}

/// Density of emotionally charged vocabulary.
pub fn sentiment_score(text: &str) -> u8 {
    let tokens = Tokens::new(text);
    to_score(tokens.density(tokens.count(EMOTIONAL_WORDS)) * 20.0)
}

/// Density of absolutist and loaded vocabulary.
pub fn bias_score(text: &str) -> u8 {
    let tokens = Tokens::new(text);
    to_score(tokens.density(tokens.count(LOADED_WORDS)) * 15.0)
}
