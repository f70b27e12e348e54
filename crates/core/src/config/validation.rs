//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.gemini_base_url.trim().is_empty() {
            return Err(invalid("gemini_base_url", "must not be empty"));
        }
        if self.gemini_models.is_empty() {
            return Err(invalid("gemini_models", "at least one model is required"));
        }
        if self.gemini_models.iter().any(|m| m.trim().is_empty()) {
            return Err(invalid("gemini_models", "model names must not be empty"));
        }

        let timeouts = [("candidate_timeout_ms", self.candidate_timeout_ms), ("fetch_timeout_ms", self.fetch_timeout_ms)];
        for (field, value) in timeouts {
            if value < 100 {
                return Err(invalid(field, "must be at least 100ms"));
            }
            if value > 300_000 {
                return Err(invalid(field, "must not exceed 5 minutes (300000ms)"));
            }
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        for (field, value) in [
            ("cooldown_secs", self.cooldown_secs),
            ("cache_ttl_minutes", self.cache_ttl_minutes),
            ("cache_sweep_secs", self.cache_sweep_secs),
            ("rate_sweep_secs", self.rate_sweep_secs),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0"));
            }
        }

        if self.prompt_max_chars == 0 {
            return Err(invalid("prompt_max_chars", "must be greater than 0"));
        }
        if self.cache_max_entries == 0 {
            return Err(invalid("cache_max_entries", "must be greater than 0"));
        }
        if self.rate_limit == 0 {
            return Err(invalid("rate_limit", "must be greater than 0"));
        }
        if self.rate_window_ms < 1000 {
            return Err(invalid("rate_window_ms", "must be at least 1000ms"));
        }

        if self.max_text_chars == 0 {
            return Err(invalid("max_text_chars", "must be greater than 0"));
        }
        if self.min_text_chars >= self.max_text_chars {
            return Err(invalid("min_text_chars", "must be less than max_text_chars"));
        }

        if !(0.0..=100.0).contains(&self.degraded_failure_percent) {
            return Err(invalid("degraded_failure_percent", "must be between 0 and 100"));
        }

        if self.gemini_api_key().is_none() {
            tracing::warn!("no Gemini API key configured; every analysis will return the fallback verdict");
        }

        Ok(())
    }
}
