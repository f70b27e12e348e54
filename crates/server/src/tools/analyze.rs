//! analyze tool implementation.
//!
//! Runs the full analysis pipeline over inline text or a URL.

use crate::pipeline::{Analysis, AnalysisPipeline, AnalyzeRequest};

use chrono::{DateTime, Utc};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use verity_core::{AnalysisResult, Error, UNKNOWN_CLIENT};

/// How a verdict was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeMeta {
    pub cached: bool,
    /// Milliseconds spent on the request.
    pub processing_time: u64,
    pub timestamp: DateTime<Utc>,
    pub fallback: bool,
}

/// Verdict with its metadata, as returned by both surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeOutput {
    #[serde(flatten)]
    pub result: AnalysisResult,
    pub meta: AnalyzeMeta,
}

impl From<Analysis> for AnalyzeOutput {
    fn from(analysis: Analysis) -> Self {
        Self {
            result: analysis.result,
            meta: AnalyzeMeta {
                cached: analysis.cached,
                processing_time: analysis.processing_ms,
                timestamp: Utc::now(),
                fallback: analysis.fallback,
            },
        }
    }
}

/// stdio carries no client identity, so every call shares one bucket.
pub async fn analyze_impl(pipeline: &AnalysisPipeline, params: AnalyzeRequest) -> Result<CallToolResult, McpError> {
    let analysis = pipeline.analyze(UNKNOWN_CLIENT, params).await?;
    let output = AnalyzeOutput::from(analysis);
    let json = serde_json::to_string_pretty(&output).map_err(Error::from)?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{ARTICLE, MockCandidate, StubSource, VERDICT, pipeline_with};
    use rmcp::model::ErrorCode;
    use verity_core::AppConfig;

    #[tokio::test]
    async fn test_analyze_impl_returns_verdict() {
        let candidate = MockCandidate::replying(Ok(VERDICT.to_string()));
        let pipeline = pipeline_with(AppConfig::default(), candidate, StubSource::article("")).await;

        let params = AnalyzeRequest { text: Some(ARTICLE.into()), url: None };
        let result = analyze_impl(&pipeline, params).await.unwrap();
        assert!(!result.is_error.unwrap_or(false));

        let text = result.content[0].as_text().unwrap().text.clone();
        let output: AnalyzeOutput = serde_json::from_str(&text).unwrap();
        assert_eq!(output.result.confidence, 82);
        assert!(!output.meta.cached);
    }

    #[tokio::test]
    async fn test_analyze_impl_missing_input_is_invalid_params() {
        let candidate = MockCandidate::replying(Ok(VERDICT.to_string()));
        let pipeline = pipeline_with(AppConfig::default(), candidate, StubSource::article("")).await;

        let err = analyze_impl(&pipeline, AnalyzeRequest::default()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode(-32602));
    }

    #[tokio::test]
    async fn test_analyze_impl_shares_unknown_bucket() {
        let config = AppConfig { rate_limit: 1, ..AppConfig::default() };
        let candidate = MockCandidate::replying(Ok(VERDICT.to_string()));
        let pipeline = pipeline_with(config, candidate, StubSource::article("")).await;

        let params = AnalyzeRequest { text: Some(ARTICLE.into()), url: None };
        analyze_impl(&pipeline, params.clone()).await.unwrap();

        let err = analyze_impl(&pipeline, params).await.unwrap_err();
        assert_eq!(err.code, ErrorCode(-32010));
    }
}
