//! Recovering a verdict from free-form model output.

use super::CandidateFailure;
use verity_core::ModelVerdict;

const PREVIEW_CHARS: usize = 200;

/// Parse generated text into a [`ModelVerdict`].
///
/// Tries the whole text first, then the span from the first `{` to the last
/// `}` to get past markdown fences and chatter.
pub fn parse_verdict(raw: &str) -> Result<ModelVerdict, CandidateFailure> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CandidateFailure::EmptyResponse { finish_reason: "EMPTY_TEXT".to_string() });
    }

    if let Ok(verdict) = serde_json::from_str::<ModelVerdict>(trimmed) {
        return Ok(verdict);
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
        && let Ok(verdict) = serde_json::from_str::<ModelVerdict>(&trimmed[start..=end])
    {
        return Ok(verdict);
    }

    Err(CandidateFailure::Unparseable { preview: trimmed.chars().take(PREVIEW_CHARS).collect() })
}
