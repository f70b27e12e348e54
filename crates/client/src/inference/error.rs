//! Inference candidate failure types.

/// Why a single candidate attempt produced no verdict.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CandidateFailure {
    /// No API credential configured; nothing was sent.
    #[error("missing API key: GEMINI_API_KEY not set")]
    MissingCredential,

    /// Upstream quota or rate limit (HTTP 429).
    #[error("rate limited: too many requests")]
    Throttled,

    /// Any other non-success status.
    #[error("HTTP error {status}: {message}")]
    Status { status: u16, message: String },

    /// The response carried no generated text.
    #[error("empty response (finish reason: {finish_reason})")]
    EmptyResponse { finish_reason: String },

    /// Generated text held no parseable verdict.
    #[error("unparseable response: {preview}")]
    Unparseable { preview: String },

    /// The attempt exceeded its time budget.
    #[error("request timeout")]
    Timeout,

    /// Connection or protocol error.
    #[error("network error: {0}")]
    Transport(String),
}

impl CandidateFailure {
    /// Whether the candidate should be rested before it is tried again.
    pub fn is_throttle(&self) -> bool {
        matches!(self, CandidateFailure::Throttled)
    }
}

impl From<reqwest::Error> for CandidateFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { CandidateFailure::Timeout } else { CandidateFailure::Transport(err.to_string()) }
    }
}
