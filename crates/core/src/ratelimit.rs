//! Fixed-window per-client rate limiting.
//!
//! Each client id owns one window `{count, reset_at}`. Windows are created on
//! first use and dropped by the sweep once they have elapsed.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Bucket shared by every client that cannot be identified.
pub const UNKNOWN_CLIENT: &str = "unknown";

const STATS_CLIENT_LIMIT: usize = 10;
const MASKED_PREFIX_CHARS: usize = 10;

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Outcome of a single rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Whole seconds until the window resets, set only when rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// A tracked client as shown on the statistics surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackedClient {
    pub client: String,
    pub count: u32,
    pub reset_in_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStats {
    pub total_tracked: usize,
    pub active_clients: usize,
    pub clients: Vec<TrackedClient>,
}

/// Per-client request counter.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, ClientWindow>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn check(&self, client_id: &str, limit: u32, window: Duration) -> RateDecision {
        self.check_at(client_id, limit, window, Utc::now()).await
    }

    /// Count one request from `client_id` at `now`.
    ///
    /// A missing or elapsed window starts fresh with a count of one. Within a
    /// live window the request is allowed while `count < limit`.
    pub async fn check_at(&self, client_id: &str, limit: u32, window: Duration, now: DateTime<Utc>) -> RateDecision {
        let limit = limit.max(1);
        let span = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        let mut windows = self.windows.lock().await;

        let entry = windows
            .entry(client_id.to_string())
            .or_insert(ClientWindow { count: 0, reset_at: now });

        if entry.count == 0 || now > entry.reset_at {
            let reset_at = now.checked_add_signed(span).unwrap_or(DateTime::<Utc>::MAX_UTC);
            *entry = ClientWindow { count: 1, reset_at };
            return RateDecision {
                allowed: true,
                limit,
                remaining: limit - 1,
                reset_at: entry.reset_at,
                retry_after_secs: None,
            };
        }

        if entry.count < limit {
            entry.count += 1;
            return RateDecision {
                allowed: true,
                limit,
                remaining: limit - entry.count,
                reset_at: entry.reset_at,
                retry_after_secs: None,
            };
        }

        let wait_ms = (entry.reset_at - now).num_milliseconds().max(0) as u64;
        tracing::debug!(client = %mask(client_id), wait_ms, "rate limit exceeded");

        RateDecision {
            allowed: false,
            limit,
            remaining: 0,
            reset_at: entry.reset_at,
            retry_after_secs: Some(wait_ms.div_ceil(1000)),
        }
    }

    /// Drop elapsed windows. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| now <= w.reset_at);
        before - windows.len()
    }

    /// Sweep on a fixed interval until the task is aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let removed = limiter.sweep().await;
                if removed > 0 {
                    tracing::debug!(removed, "swept expired rate-limit windows");
                }
            }
        })
    }

    pub async fn stats(&self) -> RateLimitStats {
        self.stats_at(Utc::now()).await
    }

    /// Snapshot of tracked windows, busiest first.
    pub async fn stats_at(&self, now: DateTime<Utc>) -> RateLimitStats {
        let windows = self.windows.lock().await;

        let mut active: Vec<(&String, &ClientWindow)> = windows.iter().filter(|(_, w)| now <= w.reset_at).collect();
        active.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)));

        let clients = active
            .iter()
            .take(STATS_CLIENT_LIMIT)
            .map(|(id, w)| TrackedClient {
                client: mask(id),
                count: w.count,
                reset_in_secs: ((w.reset_at - now).num_milliseconds().max(0) as u64).div_ceil(1000),
            })
            .collect();

        RateLimitStats { total_tracked: windows.len(), active_clients: active.len(), clients }
    }
}

fn mask(client_id: &str) -> String {
    if client_id.chars().count() <= MASKED_PREFIX_CHARS {
        return client_id.to_string();
    }
    let prefix: String = client_id.chars().take(MASKED_PREFIX_CHARS).collect();
    format!("{prefix}...")
}

/// Derive a client id from proxy headers.
///
/// Prefers the first `X-Forwarded-For` hop, then `X-Real-IP`. Clients with
/// neither share the [`UNKNOWN_CLIENT`] bucket.
pub fn resolve_client_id(forwarded_for: Option<&str>, real_ip: Option<&str>) -> String {
    forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| real_ip.map(str::trim).filter(|v| !v.is_empty()))
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}
