//! Process-wide call counters and derived health.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
struct LastError {
    message: String,
    at: DateTime<Utc>,
}

/// Monotonic counters shared by every request.
#[derive(Debug, Default)]
pub struct CallStats {
    total_calls: AtomicU64,
    cache_hits: AtomicU64,
    api_calls: AtomicU64,
    failures: AtomicU64,
    last_error: Mutex<Option<LastError>>,
}

/// Point-in-time view of [`CallStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallMetrics {
    pub total_calls: u64,
    pub cache_hits: u64,
    pub api_calls: u64,
    pub failures: u64,
    pub cache_hit_rate: f64,
    pub failure_rate: f64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: HealthStatus,
    pub message: String,
}

impl CallStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_api_call(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.record_error_at(message, Utc::now());
    }

    pub fn record_error_at(&self, message: impl Into<String>, at: DateTime<Utc>) {
        let mut last = self.last_error.lock().unwrap_or_else(PoisonError::into_inner);
        *last = Some(LastError { message: message.into(), at });
    }

    pub fn snapshot(&self) -> CallMetrics {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let api_calls = self.api_calls.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let last = self.last_error.lock().unwrap_or_else(PoisonError::into_inner).clone();

        CallMetrics {
            total_calls,
            cache_hits,
            api_calls,
            failures,
            cache_hit_rate: percent(cache_hits, total_calls),
            failure_rate: percent(failures, api_calls),
            last_error: last.as_ref().map(|e| e.message.clone()),
            last_error_time: last.map(|e| e.at),
        }
    }
}

impl CallMetrics {
    /// Healthy while the failure rate stays under `degraded_percent`.
    pub fn health(&self, degraded_percent: f64) -> Health {
        let status = if self.failure_rate < degraded_percent { HealthStatus::Healthy } else { HealthStatus::Degraded };
        let message = match self.failures {
            0 => "All systems operational".to_string(),
            n => format!("{n} API failures detected"),
        };
        Health { status, message }
    }
}

/// Percentage rounded to two decimals; zero when nothing was counted.
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 10_000.0).round() / 100.0
}
