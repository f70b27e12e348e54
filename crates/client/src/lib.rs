//! Outbound I/O for verity.
//!
//! This crate provides the HTTP fetch pipeline, article extraction, and the
//! inference candidates with their retry orchestrator.

pub mod extract;
pub mod fetch;
pub mod inference;

pub use extract::{
    ContentSource, ExtractedContent, ExtractionResult, ExtractionStrategy, Extractor, PageExtractor, ScraperExtractor,
};

pub use fetch::{FetchClient, FetchConfig, FetchResponse};

pub use inference::{
    CandidateFailure, GeminiCandidate, InferenceCandidate, Orchestrator, OrchestratorConfig, OrchestratorStatus,
    Outcome, gemini_candidates,
};
