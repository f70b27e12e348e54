//! scrape_url tool implementation.
//!
//! Fetches a page and returns the extracted article without analyzing it.

use crate::pipeline::AnalysisPipeline;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use verity_core::{Error, UNKNOWN_CLIENT};

/// Parameters for the scrape_url tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScrapeParams {
    /// Page to fetch; `https://` is assumed when no scheme is given.
    pub url: String,
}

/// A failed extraction is returned as a tool error carrying the result.
pub async fn scrape_impl(pipeline: &AnalysisPipeline, params: ScrapeParams) -> Result<CallToolResult, McpError> {
    let result = pipeline.scrape(UNKNOWN_CLIENT, &params.url).await?;
    let json = serde_json::to_string_pretty(&result).map_err(Error::from)?;

    if result.success {
        Ok(CallToolResult::success(vec![Content::text(json)]))
    } else {
        Ok(CallToolResult::error(vec![Content::text(json)]))
    }
}
