//! Analysis pipeline.
//!
//! Composes the rate limiter, content source, fingerprint cache and retry
//! orchestrator into the single `analyze` operation both surfaces expose.
//!
//! Stage order per request:
//! 1. Rate limit (rejections surface as [`Error::RateLimited`])
//! 2. Resolve input; a URL takes precedence over inline text
//! 3. Bound the text (minimum length, hard cut at the maximum)
//! 4. Fingerprint and consult the cache
//! 5. Collapse concurrent misses on the same fingerprint
//! 6. Run the orchestrator; exhaustion yields the neutral fallback

mod in_flight;

use in_flight::InFlight;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use verity_client::extract::truncate_chars;
use verity_client::{
    ContentSource, ExtractionResult, FetchClient, FetchConfig, Orchestrator, OrchestratorConfig, OrchestratorStatus,
    Outcome, PageExtractor, ScraperExtractor, gemini_candidates,
};
use verity_core::cache::compute_fingerprint;
use verity_core::{
    AnalysisResult, AppConfig, CacheDb, CacheStats, CallMetrics, CallStats, Error, Health, RateDecision,
    RateLimitStats, RateLimiter, ResultCache,
};

/// Input to [`AnalysisPipeline::analyze`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeRequest {
    /// Article text to assess.
    #[serde(default)]
    pub text: Option<String>,
    /// Page to fetch and assess; wins over `text` when both are given.
    #[serde(default)]
    pub url: Option<String>,
}

/// A verdict plus how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub result: AnalysisResult,
    pub cached: bool,
    pub fallback: bool,
    pub processing_ms: u64,
    pub rate: RateDecision,
}

/// Everything the statistics surface reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub api: CallMetrics,
    pub cache: CacheStats,
    pub rate_limit: RateLimitStats,
    pub inference: OrchestratorStatus,
    pub health: Health,
    pub timestamp: DateTime<Utc>,
}

/// Owns the shared state behind both transports.
pub struct AnalysisPipeline {
    config: AppConfig,
    limiter: RateLimiter,
    cache: ResultCache,
    stats: CallStats,
    orchestrator: Orchestrator,
    source: Arc<dyn ContentSource>,
    in_flight: InFlight,
}

impl AnalysisPipeline {
    pub fn new(
        config: AppConfig, cache: ResultCache, orchestrator: Orchestrator, source: Arc<dyn ContentSource>,
    ) -> Self {
        Self {
            config,
            limiter: RateLimiter::new(),
            cache,
            stats: CallStats::new(),
            orchestrator,
            source,
            in_flight: InFlight::new(),
        }
    }

    /// Wire up the production collaborators described by `config`.
    pub async fn from_config(config: AppConfig) -> Result<Self, Error> {
        let db = CacheDb::open_or_in_memory(config.cache_db_path.as_deref()).await?;
        let cache = ResultCache::new(db, config.cache_ttl(), config.cache_max_entries);

        let candidates = gemini_candidates(&config)?;
        if config.gemini_api_key().is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; every analysis will return the fallback verdict");
        }
        let orchestrator = Orchestrator::new(candidates, OrchestratorConfig::from(&config));

        let fetch = FetchClient::new(FetchConfig::from(&config))?;
        let source = PageExtractor::new(fetch, Box::new(ScraperExtractor::new()?));

        Ok(Self::new(config, cache, orchestrator, Arc::new(source)))
    }

    /// Produce a verdict for `request` on behalf of `client_id`.
    ///
    /// Only validation, extraction and throttle errors escape; upstream and
    /// internal faults are absorbed into the fallback verdict.
    pub async fn analyze(&self, client_id: &str, request: AnalyzeRequest) -> Result<Analysis, Error> {
        let started = Instant::now();
        let rate = self.admit(client_id).await?;

        let text = self.resolve_text(request).await?;
        let text = self.bound_text(&text)?;

        self.stats.record_call();
        let fingerprint = compute_fingerprint(&text, self.config.max_text_chars);

        if let Some(result) = self.lookup(&fingerprint).await {
            tracing::debug!(client = client_id, fingerprint = %fingerprint, "cache hit");
            return Ok(self.cache_hit(result, started, rate));
        }

        let _slot = if self.config.collapse_in_flight {
            let slot = self.in_flight.acquire(&fingerprint).await;
            if let Some(result) = self.lookup(&fingerprint).await {
                tracing::debug!(client = client_id, fingerprint = %fingerprint, "cache hit after in-flight wait");
                return Ok(self.cache_hit(result, started, rate));
            }
            Some(slot)
        } else {
            None
        };

        self.stats.record_api_call();
        let (result, fallback) = match self.orchestrator.run(&text).await {
            Outcome::Success { verdict, candidate } => {
                let result = AnalysisResult::from_verdict(verdict, &text, &candidate);
                if let Err(e) = self.cache.put(&fingerprint, &result).await {
                    tracing::warn!(error = %e, "failed to store analysis");
                    self.stats.record_error(e.to_string());
                }
                (result, false)
            }
            Outcome::Exhausted { attempts } => {
                let summary = Outcome::attempts_summary(&attempts);
                tracing::warn!(client = client_id, "returning fallback verdict: {summary}");
                self.stats.record_failure();
                self.stats.record_error(format!("All models failed: {summary}"));
                (AnalysisResult::fallback(), true)
            }
        };

        let processing_ms = elapsed_ms(started);
        tracing::info!(client = client_id, fallback, processing_ms, "analysis complete");

        Ok(Analysis { result, cached: false, fallback, processing_ms, rate })
    }

    /// Fetch and extract `url` on behalf of `client_id`.
    pub async fn scrape(&self, client_id: &str, url: &str) -> Result<ExtractionResult, Error> {
        self.admit(client_id).await?;

        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidInput("url is required".into()));
        }

        Ok(self.source.extract_url(url).await)
    }

    pub async fn stats_report(&self) -> Result<StatsReport, Error> {
        let api = self.stats.snapshot();
        let health = api.health(self.config.degraded_failure_percent);

        Ok(StatsReport {
            api,
            cache: self.cache.stats().await?,
            rate_limit: self.limiter.stats().await,
            inference: self.orchestrator.status(),
            health,
            timestamp: Utc::now(),
        })
    }

    /// Derived health alone, for liveness checks.
    pub fn health(&self) -> Health {
        self.stats.snapshot().health(self.config.degraded_failure_percent)
    }

    /// Start the cache and rate-limit sweepers.
    pub fn spawn_sweepers(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.cache.spawn_sweeper(self.config.cache_sweep_interval()),
            self.limiter.spawn_sweeper(self.config.rate_sweep_interval()),
        ]
    }

    async fn admit(&self, client_id: &str) -> Result<RateDecision, Error> {
        let decision = self
            .limiter
            .check(client_id, self.config.rate_limit, self.config.rate_window())
            .await;

        if decision.allowed {
            return Ok(decision);
        }

        let retry_after_secs = decision.retry_after_secs.unwrap_or(1);
        tracing::warn!(client = client_id, retry_after_secs, "rate limit exceeded");
        Err(Error::RateLimited { retry_after_secs, limit: decision.limit, reset_at: decision.reset_at })
    }

    async fn resolve_text(&self, request: AnalyzeRequest) -> Result<String, Error> {
        let url = request.url.filter(|u| !u.trim().is_empty());
        let text = request.text.filter(|t| !t.trim().is_empty());

        match (url, text) {
            (Some(url), _) => {
                let extraction = self.source.extract_url(url.trim()).await;
                if !extraction.success {
                    let reason = extraction.error.unwrap_or_else(|| "extraction failed".into());
                    return Err(Error::ExtractFailed(format!("Failed to extract content from URL: {reason}")));
                }
                Ok(extraction.body_text)
            }
            (None, Some(text)) => Ok(text),
            (None, None) => Err(Error::InvalidInput("Either text or url must be provided".into())),
        }
    }

    fn bound_text(&self, text: &str) -> Result<String, Error> {
        let min = self.config.min_text_chars;
        if text.trim().chars().count() < min {
            return Err(Error::InvalidInput(format!("Text must be at least {min} characters")));
        }
        Ok(truncate_chars(text, self.config.max_text_chars).to_string())
    }

    fn cache_hit(&self, result: AnalysisResult, started: Instant, rate: RateDecision) -> Analysis {
        self.stats.record_cache_hit();
        Analysis { result, cached: true, fallback: false, processing_ms: elapsed_ms(started), rate }
    }

    async fn lookup(&self, fingerprint: &str) -> Option<AnalysisResult> {
        match self.cache.get(fingerprint).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, "cache read failed; treating as miss");
                self.stats.record_error(e.to_string());
                None
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use verity_client::{CandidateFailure, InferenceCandidate};
    use verity_core::{ErrorKind, HealthStatus, Prediction};

    pub(crate) const VERDICT: &str =
        r#"{"prediction":"REAL","confidence":82,"credibilityScore":77,"reasoning":"Sourced and measured."}"#;

    pub(crate) const ARTICLE: &str =
        "The city council approved the new transit budget on Tuesday after a lengthy public hearing.";

    pub(crate) struct MockCandidate {
        reply: Result<String, CandidateFailure>,
        delay: Duration,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl MockCandidate {
        pub(crate) fn replying(reply: Result<String, CandidateFailure>) -> Arc<Self> {
            Arc::new(Self { reply, delay: Duration::ZERO, calls: AtomicUsize::new(0), seen: Mutex::new(Vec::new()) })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(VERDICT.to_string()),
                delay,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceCandidate for MockCandidate {
        fn id(&self) -> &str {
            "mock-model"
        }

        async fn invoke(&self, text: &str) -> Result<String, CandidateFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(text.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone()
        }
    }

    pub(crate) struct StubSource {
        result: ExtractionResult,
    }

    impl StubSource {
        pub(crate) fn article(body: &str) -> Arc<Self> {
            Arc::new(Self {
                result: ExtractionResult {
                    url: "https://news.example.com/story".into(),
                    title: "Story".into(),
                    body_text: body.into(),
                    domain: "news.example.com".into(),
                    success: true,
                    error: None,
                    author: Some("Unknown".into()),
                    published_at: None,
                    strategy: None,
                },
            })
        }

        fn failing(reason: &str) -> Arc<Self> {
            Arc::new(Self { result: ExtractionResult::failed("https://news.example.com/story", reason) })
        }
    }

    #[async_trait]
    impl ContentSource for StubSource {
        async fn extract_url(&self, _url: &str) -> ExtractionResult {
            self.result.clone()
        }
    }

    pub(crate) async fn pipeline_with(
        config: AppConfig, candidate: Arc<MockCandidate>, source: Arc<dyn ContentSource>,
    ) -> AnalysisPipeline {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = ResultCache::new(db, config.cache_ttl(), config.cache_max_entries);
        let orchestrator = Orchestrator::new(
            vec![candidate as Arc<dyn InferenceCandidate>],
            OrchestratorConfig {
                attempt_timeout: Duration::from_secs(5),
                cooldown: Duration::from_secs(60),
                prompt_max_chars: 3000,
                configured: true,
            },
        );
        AnalysisPipeline::new(config, cache, orchestrator, source)
    }

    fn text_request(text: &str) -> AnalyzeRequest {
        AnalyzeRequest { text: Some(text.to_string()), url: None }
    }

    #[tokio::test]
    async fn test_repeat_request_is_served_from_cache() {
        let candidate = MockCandidate::replying(Ok(VERDICT.to_string()));
        let pipeline = pipeline_with(AppConfig::default(), candidate.clone(), StubSource::article("")).await;

        let first = pipeline.analyze("client-a", text_request(ARTICLE)).await.unwrap();
        let second = pipeline.analyze("client-a", text_request(ARTICLE)).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.result, second.result);
        assert_eq!(first.result.prediction, Prediction::Real);
        assert_eq!(first.result.model.as_deref(), Some("mock-model"));
        assert_eq!(candidate.calls(), 1);

        let metrics = pipeline.stats.snapshot();
        assert_eq!(metrics.total_calls, 2);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.api_calls, 1);
        assert_eq!(metrics.cache_hit_rate, 50.0);
    }

    #[tokio::test]
    async fn test_surrounding_whitespace_shares_fingerprint() {
        let candidate = MockCandidate::replying(Ok(VERDICT.to_string()));
        let pipeline = pipeline_with(AppConfig::default(), candidate.clone(), StubSource::article("")).await;

        pipeline.analyze("client-a", text_request(ARTICLE)).await.unwrap();
        let padded = format!("  \n{ARTICLE}\t ");
        let again = pipeline.analyze("client-a", text_request(&padded)).await.unwrap();

        assert!(again.cached);
        assert_eq!(candidate.calls(), 1);
    }

    #[tokio::test]
    async fn test_long_text_cut_to_exactly_max_chars() {
        let candidate = MockCandidate::replying(Ok(VERDICT.to_string()));
        let pipeline = pipeline_with(AppConfig::default(), candidate.clone(), StubSource::article("")).await;

        let long: String = "é".repeat(6000);
        let bounded = pipeline.bound_text(&long).unwrap();
        assert_eq!(bounded.chars().count(), 5000);
        assert!(long.starts_with(&bounded));
        assert!(!bounded.ends_with("..."));

        pipeline.analyze("client-a", text_request(&long)).await.unwrap();
        let prefix: String = long.chars().take(5000).collect();
        let again = pipeline.analyze("client-a", text_request(&prefix)).await.unwrap();
        assert!(again.cached);
    }

    #[tokio::test]
    async fn test_missing_input_is_validation_error() {
        let candidate = MockCandidate::replying(Ok(VERDICT.to_string()));
        let pipeline = pipeline_with(AppConfig::default(), candidate.clone(), StubSource::article("")).await;

        let err = pipeline.analyze("client-a", AnalyzeRequest::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("Either text or url must be provided"));

        let blank = AnalyzeRequest { text: Some("   ".into()), url: Some(" ".into()) };
        let err = pipeline.analyze("client-a", blank).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        assert_eq!(candidate.calls(), 0);
        assert_eq!(pipeline.stats.snapshot().total_calls, 0);
    }

    #[tokio::test]
    async fn test_short_text_rejected() {
        let candidate = MockCandidate::replying(Ok(VERDICT.to_string()));
        let pipeline = pipeline_with(AppConfig::default(), candidate.clone(), StubSource::article("")).await;

        let err = pipeline.analyze("client-a", text_request("Too short.")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("at least 50")));

        let padded = format!("{:>60}", "Too short.");
        assert_eq!(padded.chars().count(), 60);
        let err = pipeline.analyze("client-a", text_request(&padded)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(candidate.calls(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_uncached_fallback() {
        let failure = CandidateFailure::Status { status: 500, message: "backend error".into() };
        let candidate = MockCandidate::replying(Err(failure));
        let pipeline = pipeline_with(AppConfig::default(), candidate.clone(), StubSource::article("")).await;

        let first = pipeline.analyze("client-a", text_request(ARTICLE)).await.unwrap();
        assert!(first.fallback);
        assert!(!first.cached);
        assert_eq!(first.result, AnalysisResult::fallback());

        let second = pipeline.analyze("client-a", text_request(ARTICLE)).await.unwrap();
        assert!(second.fallback);
        assert!(!second.cached);
        assert_eq!(candidate.calls(), 2);

        let metrics = pipeline.stats.snapshot();
        assert_eq!(metrics.failures, 2);
        assert_eq!(metrics.failure_rate, 100.0);
        let last_error = metrics.last_error.unwrap();
        assert!(last_error.starts_with("All models failed"));
        assert!(last_error.contains("mock-model"));
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_before_any_work() {
        let config = AppConfig { rate_limit: 2, ..AppConfig::default() };
        let candidate = MockCandidate::replying(Ok(VERDICT.to_string()));
        let pipeline = pipeline_with(config, candidate.clone(), StubSource::article("")).await;

        let first = pipeline.analyze("client-a", text_request(ARTICLE)).await.unwrap();
        assert_eq!(first.rate.remaining, 1);
        pipeline.analyze("client-a", text_request(ARTICLE)).await.unwrap();

        let err = pipeline.analyze("client-a", text_request(ARTICLE)).await.unwrap_err();
        match err {
            Error::RateLimited { retry_after_secs, limit, .. } => {
                assert!((1..=60).contains(&retry_after_secs));
                assert_eq!(limit, 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(pipeline.stats.snapshot().total_calls, 2);

        let other_client = pipeline.analyze("client-b", text_request(ARTICLE)).await.unwrap();
        assert_eq!(other_client.rate.remaining, 1);
    }

    #[tokio::test]
    async fn test_url_takes_precedence_over_text() {
        let body = "Officials confirmed the bridge will reopen next week following structural inspections downtown.";
        let candidate = MockCandidate::replying(Ok(VERDICT.to_string()));
        let pipeline = pipeline_with(AppConfig::default(), candidate.clone(), StubSource::article(body)).await;

        let request = AnalyzeRequest { text: Some(ARTICLE.into()), url: Some("https://news.example.com/story".into()) };
        pipeline.analyze("client-a", request).await.unwrap();

        let seen = candidate.seen.lock().unwrap();
        assert_eq!(*seen, vec![body.to_string()]);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_validation_class() {
        let candidate = MockCandidate::replying(Ok(VERDICT.to_string()));
        let source = StubSource::failing("HTTP_ERROR: status 404");
        let pipeline = pipeline_with(AppConfig::default(), candidate.clone(), source).await;

        let request = AnalyzeRequest { text: None, url: Some("https://news.example.com/missing".into()) };
        let err = pipeline.analyze("client-a", request).await.unwrap_err();

        assert!(err.is_validation_class());
        assert!(err.to_string().contains("status 404"));
        assert_eq!(candidate.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_collapse_to_one_call() {
        let candidate = MockCandidate::slow(Duration::from_millis(100));
        let pipeline = pipeline_with(AppConfig::default(), candidate.clone(), StubSource::article("")).await;

        let (a, b) = tokio::join!(
            pipeline.analyze("client-a", text_request(ARTICLE)),
            pipeline.analyze("client-b", text_request(ARTICLE)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(candidate.calls(), 1);
        assert!(a.cached ^ b.cached);
        assert_eq!(a.result, b.result);
        assert!(pipeline.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_without_collapse_both_misses_reach_candidate() {
        let config = AppConfig { collapse_in_flight: false, ..AppConfig::default() };
        let candidate = MockCandidate::slow(Duration::from_millis(100));
        let pipeline = pipeline_with(config, candidate.clone(), StubSource::article("")).await;

        let (a, b) = tokio::join!(
            pipeline.analyze("client-a", text_request(ARTICLE)),
            pipeline.analyze("client-b", text_request(ARTICLE)),
        );

        assert!(!a.unwrap().cached);
        assert!(!b.unwrap().cached);
        assert_eq!(candidate.calls(), 2);
    }

    #[tokio::test]
    async fn test_scrape_returns_extraction_and_counts_against_limit() {
        let config = AppConfig { rate_limit: 1, ..AppConfig::default() };
        let candidate = MockCandidate::replying(Ok(VERDICT.to_string()));
        let pipeline = pipeline_with(config, candidate, StubSource::article("Body text")).await;

        let result = pipeline.scrape("client-a", "https://news.example.com/story").await.unwrap();
        assert!(result.success);
        assert_eq!(result.body_text, "Body text");

        let err = pipeline.scrape("client-a", "https://news.example.com/story").await.unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_stats_report_reflects_activity() {
        let candidate = MockCandidate::replying(Ok(VERDICT.to_string()));
        let pipeline = pipeline_with(AppConfig::default(), candidate, StubSource::article("")).await;

        pipeline.analyze("client-a", text_request(ARTICLE)).await.unwrap();
        let report = pipeline.stats_report().await.unwrap();

        assert_eq!(report.api.total_calls, 1);
        assert_eq!(report.cache.valid_entries, 1);
        assert_eq!(report.rate_limit.total_tracked, 1);
        assert_eq!(report.inference.candidates, vec!["mock-model".to_string()]);
        assert_eq!(report.inference.last_successful.as_deref(), Some("mock-model"));
        assert_eq!(report.health.status, HealthStatus::Healthy);
        assert_eq!(report.health.message, "All systems operational");
    }
}
