//! Inference candidates and the retry orchestrator.
//!
//! A candidate is one remote model that turns article text into raw
//! generated text. The [`Orchestrator`] walks an ordered list of candidates
//! until one yields a parseable verdict, resting candidates that report
//! throttling.

pub mod error;
pub mod gemini;
pub mod orchestrator;
pub mod parse;

pub use error::CandidateFailure;
pub use gemini::{GeminiCandidate, GeminiConfig, gemini_candidates};
pub use orchestrator::{AttemptFailure, FailureRecord, Orchestrator, OrchestratorConfig, OrchestratorStatus, Outcome};
pub use parse::parse_verdict;

use async_trait::async_trait;

/// A remote model that can be asked for a verdict.
#[async_trait]
pub trait InferenceCandidate: Send + Sync {
    /// Stable identifier, used for cooldowns and reporting.
    fn id(&self) -> &str;

    /// Submit `text` and return the model's raw output.
    async fn invoke(&self, text: &str) -> Result<String, CandidateFailure>;
}
