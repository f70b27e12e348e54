//! MCP tool implementations.
//!
//! This module contains all tools exposed by the verity server.

pub mod analyze;
pub mod scrape;
pub mod stats;

pub use analyze::AnalyzeOutput;
pub use scrape::ScrapeParams;
