//! MCP server handler implementation.
//!
//! Routes tool calls onto the shared analysis pipeline.

use crate::pipeline::{AnalysisPipeline, AnalyzeRequest};
use crate::tools::{analyze::analyze_impl, scrape::scrape_impl, stats::stats_impl};
use crate::tools::ScrapeParams;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use std::sync::Arc;

/// The MCP server handler for verity.
#[derive(Clone)]
pub struct VerityServer {
    pipeline: Arc<AnalysisPipeline>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl VerityServer {
    pub fn new(pipeline: Arc<AnalysisPipeline>) -> Self {
        Self { pipeline, tool_router: Self::tool_router() }
    }

    /// Assess the credibility of article text or a web page.
    #[tool(description = "Assess whether news text or the article at a URL is FAKE, REAL or UNCERTAIN. \
                          Provide `text` or `url`; a URL wins when both are given.")]
    async fn analyze(&self, params: Parameters<AnalyzeRequest>) -> Result<CallToolResult, McpError> {
        analyze_impl(&self.pipeline, params.0).await
    }

    #[tool(description = "Report call counters, cache usage, rate-limit state, model status and health.")]
    async fn analysis_stats(&self) -> Result<CallToolResult, McpError> {
        stats_impl(&self.pipeline).await
    }

    #[tool(description = "Fetch a web page and extract its article title, author and body text.")]
    async fn scrape_url(&self, params: Parameters<ScrapeParams>) -> Result<CallToolResult, McpError> {
        scrape_impl(&self.pipeline, params.0).await
    }
}

impl ServerHandler for VerityServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "verity".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
