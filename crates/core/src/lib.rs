//! Core types and shared state for verity.
//!
//! This crate provides:
//! - Fingerprint cache with SQLite backend
//! - Fixed-window rate limiter
//! - Call statistics and health derivation
//! - Verdict model, neutral fallback and text heuristics
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod heuristics;
pub mod ratelimit;
pub mod stats;
pub mod verdict;

pub use cache::{CacheDb, CacheStats, ResultCache};
pub use config::{AppConfig, ConfigError, Transport};
pub use error::{Error, ErrorKind};
pub use ratelimit::{RateDecision, RateLimitStats, RateLimiter, TrackedClient, UNKNOWN_CLIENT, resolve_client_id};
pub use stats::{CallMetrics, CallStats, Health, HealthStatus};
pub use verdict::{AnalysisResult, ModelVerdict, Prediction, Signals};
