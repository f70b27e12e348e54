//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (VERITY_*)
//! 2. Bare GEMINI_API_KEY
//! 3. TOML config file (if VERITY_CONFIG_FILE set)
//! 4. Built-in defaults

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Inbound surface the binary serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// JSON over HTTP (axum).
    Http,
    /// MCP over stdio (rmcp).
    Stdio,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (VERITY_*)
/// 2. GEMINI_API_KEY
/// 3. TOML config file (if VERITY_CONFIG_FILE set)
/// 4. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which inbound surface to serve.
    #[serde(default = "default_transport")]
    pub transport: Transport,

    /// Listen address for the HTTP transport.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Gemini API credential.
    ///
    /// Set via VERITY_GEMINI_API_KEY or GEMINI_API_KEY. When absent the
    /// service still starts and every analysis degrades to the fallback.
    #[serde(default)]
    pub gemini_api_key: Option<String>,

    /// Base URL of the Gemini REST API.
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    /// Ordered candidate models, most preferred first.
    ///
    /// Set via VERITY_GEMINI_MODELS='[a, b]'.
    #[serde(default = "default_gemini_models")]
    pub gemini_models: Vec<String>,

    /// Per-candidate call timeout in milliseconds.
    #[serde(default = "default_candidate_timeout_ms")]
    pub candidate_timeout_ms: u64,

    /// Cooldown applied to a candidate after a 429, in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Maximum characters submitted to a candidate.
    #[serde(default = "default_prompt_max_chars")]
    pub prompt_max_chars: usize,

    /// User-Agent string for page fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Page fetch timeout in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Maximum bytes to fetch per page.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Refuse to fetch pages that resolve to private or reserved addresses.
    #[serde(default = "default_true")]
    pub block_private_addresses: bool,

    /// Path to the SQLite cache file. In-memory when unset.
    #[serde(default)]
    pub cache_db_path: Option<PathBuf>,

    /// Lifetime of a cached result in minutes.
    #[serde(default = "default_cache_ttl_minutes")]
    pub cache_ttl_minutes: u64,

    /// Maximum number of cached results.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Interval between expired-entry sweeps, in seconds.
    #[serde(default = "default_sweep_secs")]
    pub cache_sweep_secs: u64,

    /// Requests allowed per client per window.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Rate-limit window length in milliseconds.
    #[serde(default = "default_rate_window_ms")]
    pub rate_window_ms: u64,

    /// Interval between stale-window sweeps, in seconds.
    #[serde(default = "default_sweep_secs")]
    pub rate_sweep_secs: u64,

    /// Shortest text accepted for analysis.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,

    /// Longer text is cut to exactly this many characters.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Collapse concurrent identical requests into one upstream call.
    #[serde(default = "default_true")]
    pub collapse_in_flight: bool,

    /// Failure rate (percent) at which health reports `degraded`.
    #[serde(default = "default_degraded_failure_percent")]
    pub degraded_failure_percent: f64,
}

fn default_transport() -> Transport {
    Transport::Http
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".into()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}

fn default_gemini_models() -> Vec<String> {
    ["gemini-3-flash-preview", "gemini-2.5-flash", "gemini-2.0-flash-lite", "gemini-2.0-flash", "gemini-pro-latest"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_candidate_timeout_ms() -> u64 {
    30_000
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_prompt_max_chars() -> usize {
    3000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
        .into()
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_cache_ttl_minutes() -> u64 {
    60
}

fn default_cache_max_entries() -> usize {
    1000
}

fn default_sweep_secs() -> u64 {
    300
}

fn default_rate_limit() -> u32 {
    10
}

fn default_rate_window_ms() -> u64 {
    60_000
}

fn default_min_text_chars() -> usize {
    50
}

fn default_max_text_chars() -> usize {
    5000
}

fn default_degraded_failure_percent() -> f64 {
    50.0
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            bind_addr: default_bind_addr(),
            gemini_api_key: None,
            gemini_base_url: default_gemini_base_url(),
            gemini_models: default_gemini_models(),
            candidate_timeout_ms: default_candidate_timeout_ms(),
            cooldown_secs: default_cooldown_secs(),
            prompt_max_chars: default_prompt_max_chars(),
            user_agent: default_user_agent(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_bytes: default_max_bytes(),
            block_private_addresses: true,
            cache_db_path: None,
            cache_ttl_minutes: default_cache_ttl_minutes(),
            cache_max_entries: default_cache_max_entries(),
            cache_sweep_secs: default_sweep_secs(),
            rate_limit: default_rate_limit(),
            rate_window_ms: default_rate_window_ms(),
            rate_sweep_secs: default_sweep_secs(),
            min_text_chars: default_min_text_chars(),
            max_text_chars: default_max_text_chars(),
            collapse_in_flight: true,
            degraded_failure_percent: default_degraded_failure_percent(),
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment()
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The layered figment behind [`AppConfig::load`].
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("VERITY_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment
            .merge(Env::raw().only(&["GEMINI_API_KEY"]))
            .merge(
                Env::prefixed("VERITY_")
                    .ignore(&["CONFIG_FILE"])
                    .map(|key| key.as_str().to_lowercase().into())
                    .split("__"),
            )
    }

    /// The configured Gemini credential, if any non-empty one was provided.
    pub fn gemini_api_key(&self) -> Option<&str> {
        self.gemini_api_key.as_deref().filter(|key| !key.trim().is_empty())
    }

    /// Listen address parsed for the HTTP transport.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            field: "bind_addr".into(),
            reason: e.to_string(),
        })
    }

    pub fn candidate_timeout(&self) -> Duration {
        Duration::from_millis(self.candidate_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Fetch timeout as Duration for use with reqwest/tokio.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes * 60)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_secs)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    pub fn rate_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_sweep_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.transport, Transport::Http);
        assert_eq!(config.gemini_models.len(), 5);
        assert_eq!(config.gemini_models[0], "gemini-3-flash-preview");
        assert_eq!(config.cooldown_secs, 60);
        assert_eq!(config.prompt_max_chars, 3000);
        assert_eq!(config.fetch_timeout_ms, 10_000);
        assert_eq!(config.rate_limit, 10);
        assert_eq!(config.rate_window_ms, 60_000);
        assert_eq!(config.min_text_chars, 50);
        assert_eq!(config.max_text_chars, 5000);
        assert!(config.cache_db_path.is_none());
        assert!(config.collapse_in_flight);
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.cooldown(), Duration::from_secs(60));
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.rate_window(), Duration::from_secs(60));
        assert_eq!(config.rate_sweep_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_blank_api_key_is_absent() {
        let config = AppConfig { gemini_api_key: Some("   ".into()), ..Default::default() };
        assert!(config.gemini_api_key().is_none());

        let config = AppConfig { gemini_api_key: Some("test-key".into()), ..Default::default() };
        assert_eq!(config.gemini_api_key(), Some("test-key"));
    }

    #[test]
    fn test_socket_addr() {
        let config = AppConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 3000);

        let config = AppConfig { bind_addr: "not an address".into(), ..Default::default() };
        assert!(matches!(config.socket_addr(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_load_from_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("GEMINI_API_KEY", "from-bare-env");
            jail.set_env("VERITY_RATE_LIMIT", "25");
            jail.set_env("VERITY_TRANSPORT", "stdio");

            let config: AppConfig = AppConfig::figment().extract()?;
            assert_eq!(config.gemini_api_key(), Some("from-bare-env"));
            assert_eq!(config.rate_limit, 25);
            assert_eq!(config.transport, Transport::Stdio);
            Ok(())
        });
    }

    #[test]
    fn test_prefixed_key_wins() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("GEMINI_API_KEY", "bare");
            jail.set_env("VERITY_GEMINI_API_KEY", "prefixed");

            let config: AppConfig = AppConfig::figment().extract()?;
            assert_eq!(config.gemini_api_key(), Some("prefixed"));
            Ok(())
        });
    }

    #[test]
    fn test_load_from_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("verity.toml", "cache_max_entries = 42\ngemini_models = [\"only-model\"]\n")?;
            jail.set_env("VERITY_CONFIG_FILE", "verity.toml");

            let config: AppConfig = AppConfig::figment().extract()?;
            assert_eq!(config.cache_max_entries, 42);
            assert_eq!(config.gemini_models, vec!["only-model".to_string()]);
            Ok(())
        });
    }
}
