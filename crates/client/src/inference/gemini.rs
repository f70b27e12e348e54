//! Google Gemini `generateContent` candidate.
//!
//! ### Protocol
//!
//! - **Endpoint**: `{base_url}/models/{model}:generateContent`
//! - **Authentication**: `x-goog-api-key` header.
//! - **Request**: one user part holding the prompt; JSON response MIME type,
//!   temperature 0.1, at most 1024 output tokens.
//! - **Response**: text of the first part of the first candidate.
//! - **Failures**: 429 is [`CandidateFailure::Throttled`]; other statuses carry
//!   the API's `error.message` when present.

use super::{CandidateFailure, InferenceCandidate};
use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use verity_core::{AppConfig, Error};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Shared settings for every Gemini model.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    /// Base URL (default: https://generativelanguage.googleapis.com/v1beta).
    pub base_url: String,
    pub timeout: Duration,
}

impl From<&AppConfig> for GeminiConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            api_key: config.gemini_api_key().map(String::from),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            timeout: config.candidate_timeout(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseCandidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Fact-checking prompt for `text`.
pub fn build_prompt(text: &str) -> String {
    format!(
        r#"You are an expert fact-checker/fake news detector. Analyze the following text.

TEXT: "{text}"

Respond ONLY with valid JSON:
{{
  "prediction": "FAKE" | "REAL" | "UNCERTAIN",
  "confidence": 0-100,
  "reasoning": "2-3 sentence explanation",
  "flags": ["list", "of", "concerns"],
  "factualConcerns": ["factual", "issues"],
  "credibilityScore": 0-100
}}"#
    )
}

fn request_body(prompt: &str) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: [RequestContent { parts: [RequestPart { text: prompt }] }],
        generation_config: GenerationConfig {
            temperature: 0.1,
            max_output_tokens: 1024,
            response_mime_type: "application/json",
        },
    }
}

/// Text of the first part of the first candidate, if any.
fn generated_text(response: GenerateResponse) -> Result<String, CandidateFailure> {
    let first = response.candidates.into_iter().next();
    let finish_reason = first
        .as_ref()
        .and_then(|c| c.finish_reason.clone())
        .unwrap_or_else(|| "UNKNOWN".to_string());

    first
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or(CandidateFailure::EmptyResponse { finish_reason })
}

fn status_failure(status: reqwest::StatusCode, body: &[u8]) -> CandidateFailure {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return CandidateFailure::Throttled;
    }

    let message = serde_json::from_slice::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    CandidateFailure::Status { status: status.as_u16(), message }
}

/// One Gemini model as an inference candidate.
#[derive(Debug, Clone)]
pub struct GeminiCandidate {
    http: reqwest::Client,
    config: Arc<GeminiConfig>,
    model: String,
}

impl GeminiCandidate {
    pub fn new(http: reqwest::Client, config: Arc<GeminiConfig>, model: impl Into<String>) -> Self {
        Self { http, config, model: model.into() }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.config.base_url, self.model)
    }
}

#[async_trait]
impl InferenceCandidate for GeminiCandidate {
    fn id(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, text: &str) -> Result<String, CandidateFailure> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(CandidateFailure::MissingCredential);
        };

        let prompt = build_prompt(text);
        tracing::debug!(model = %self.model, prompt_chars = prompt.chars().count(), "calling Gemini");

        let response = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, api_key)
            .header(header::ACCEPT, "application/json")
            .json(&request_body(&prompt))
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(status_failure(status, &bytes));
        }

        let parsed: GenerateResponse = serde_json::from_slice(&bytes).map_err(|e| CandidateFailure::Unparseable {
            preview: format!("invalid response envelope: {e}"),
        })?;

        generated_text(parsed)
    }
}

/// One candidate per configured model, sharing a single HTTP client.
pub fn gemini_candidates(config: &AppConfig) -> Result<Vec<Arc<dyn InferenceCandidate>>, Error> {
    let gemini = Arc::new(GeminiConfig::from(config));

    let http = reqwest::Client::builder()
        .timeout(gemini.timeout)
        .use_rustls_tls()
        .build()
        .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

    Ok(config
        .gemini_models
        .iter()
        .map(|model| {
            let candidate = GeminiCandidate::new(http.clone(), gemini.clone(), model.clone());
            Arc::new(candidate) as Arc<dyn InferenceCandidate>
        })
        .collect())
}
