//! analysis_stats tool implementation.

use crate::pipeline::AnalysisPipeline;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use verity_core::Error;

/// Implementation of the analysis_stats tool.
pub async fn stats_impl(pipeline: &AnalysisPipeline) -> Result<CallToolResult, McpError> {
    let report = pipeline.stats_report().await?;
    let json = serde_json::to_string_pretty(&report).map_err(Error::from)?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
