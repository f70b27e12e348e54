//! Fingerprint derivation for cache keys.

use sha2::{Digest, Sha256};

/// Compute the fingerprint of an analysis input.
///
/// The text is trimmed and bounded to `max_chars` characters before hashing,
/// so identical normalized text always maps to the same key.
pub fn compute_fingerprint(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let bounded = match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    };

    let mut hasher = Sha256::new();
    hasher.update(bounded.as_bytes());
    hex::encode(hasher.finalize())
}
