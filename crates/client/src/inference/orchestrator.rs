//! Ordered failover across inference candidates.
//!
//! ### Selection
//! - Candidates cooling down after a throttle are skipped; elapsed cooldowns
//!   are cleared as they are noticed.
//! - The last candidate that produced a verdict goes first.
//! - If every candidate is cooling down, the full configured list is tried
//!   anyway rather than failing without an attempt.
//!
//! ### Attempts
//! - Each attempt has its own timeout.
//! - Any failure moves on to the next candidate; only a throttle starts a
//!   cooldown.

use super::{CandidateFailure, InferenceCandidate, parse_verdict};
use crate::extract::truncate_chars;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use verity_core::{AppConfig, ModelVerdict};

/// Failure records kept for the status surface.
const RECENT_FAILURES: usize = 20;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Per-attempt time budget (default: 30s)
    pub attempt_timeout: Duration,
    /// Rest period after a throttle (default: 60s)
    pub cooldown: Duration,
    /// Text sent to a candidate is cut to this many characters (default: 3000)
    pub prompt_max_chars: usize,
    /// Whether a credential is present; reported only.
    pub configured: bool,
}

impl From<&AppConfig> for OrchestratorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            attempt_timeout: config.candidate_timeout(),
            cooldown: config.cooldown(),
            prompt_max_chars: config.prompt_max_chars,
            configured: config.gemini_api_key().is_some(),
        }
    }
}

/// A failed attempt, as remembered for the status surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub candidate: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// A failed attempt within one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub candidate: String,
    pub failure: CandidateFailure,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { verdict: ModelVerdict, candidate: String },
    Exhausted { attempts: Vec<AttemptFailure> },
}

impl Outcome {
    /// One-line description of every failed attempt.
    pub fn attempts_summary(attempts: &[AttemptFailure]) -> String {
        if attempts.is_empty() {
            return "no inference candidates configured".to_string();
        }
        attempts
            .iter()
            .map(|a| format!("{}: {}", a.candidate, a.failure))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorStatus {
    pub configured: bool,
    pub candidates: Vec<String>,
    pub last_successful: Option<String>,
    pub cooling_down: Vec<String>,
    pub recent_failures: Vec<FailureRecord>,
}

#[derive(Debug, Default)]
struct SelectionState {
    cooldowns: HashMap<String, DateTime<Utc>>,
    last_successful: Option<String>,
    recent_failures: VecDeque<FailureRecord>,
}

/// Runs candidates in preference order until one yields a verdict.
pub struct Orchestrator {
    candidates: Vec<Arc<dyn InferenceCandidate>>,
    config: OrchestratorConfig,
    state: Mutex<SelectionState>,
}

impl Orchestrator {
    pub fn new(candidates: Vec<Arc<dyn InferenceCandidate>>, config: OrchestratorConfig) -> Self {
        Self { candidates, config, state: Mutex::new(SelectionState::default()) }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SelectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try candidates in order until one returns a parseable verdict.
    pub async fn run(&self, text: &str) -> Outcome {
        let text = truncate_chars(text, self.config.prompt_max_chars);
        let order = self.ordered_candidates_at(Utc::now());
        let mut attempts = Vec::with_capacity(order.len());

        for candidate in order {
            let id = candidate.id().to_string();

            let result = match tokio::time::timeout(self.config.attempt_timeout, candidate.invoke(text)).await {
                Ok(result) => result,
                Err(_) => Err(CandidateFailure::Timeout),
            };

            match result.and_then(|raw| parse_verdict(&raw)) {
                Ok(verdict) => {
                    tracing::info!(candidate = %id, failed_attempts = attempts.len(), "inference succeeded");
                    self.record_success(&id);
                    return Outcome::Success { verdict, candidate: id };
                }
                Err(failure) => {
                    tracing::warn!(candidate = %id, error = %failure, "inference candidate failed, trying next");
                    self.record_failure_at(&id, &failure, Utc::now());
                    attempts.push(AttemptFailure { candidate: id, failure });
                }
            }
        }

        tracing::error!(attempts = attempts.len(), "all inference candidates failed");
        Outcome::Exhausted { attempts }
    }

    /// Candidates in the order they would be tried at `now`.
    pub fn ordered_candidates_at(&self, now: DateTime<Utc>) -> Vec<Arc<dyn InferenceCandidate>> {
        let mut state = self.state();
        state.cooldowns.retain(|_, until| *until > now);

        let mut available: Vec<Arc<dyn InferenceCandidate>> = self
            .candidates
            .iter()
            .filter(|c| !state.cooldowns.contains_key(c.id()))
            .cloned()
            .collect();

        if available.is_empty() {
            return self.candidates.clone();
        }

        if let Some(last) = state.last_successful.as_deref()
            && let Some(pos) = available.iter().position(|c| c.id() == last)
        {
            let preferred = available.remove(pos);
            available.insert(0, preferred);
        }

        available
    }

    fn record_success(&self, id: &str) {
        self.state().last_successful = Some(id.to_string());
    }

    fn record_failure_at(&self, id: &str, failure: &CandidateFailure, now: DateTime<Utc>) {
        let mut state = self.state();

        if failure.is_throttle() {
            let rest = chrono::Duration::from_std(self.config.cooldown).unwrap_or(chrono::Duration::MAX);
            let until = now.checked_add_signed(rest).unwrap_or(DateTime::<Utc>::MAX_UTC);
            tracing::info!(candidate = %id, %until, "candidate throttled, cooling down");
            state.cooldowns.insert(id.to_string(), until);
        }

        if state.recent_failures.len() == RECENT_FAILURES {
            state.recent_failures.pop_front();
        }
        let record = FailureRecord { candidate: id.to_string(), reason: failure.to_string(), at: now };
        state.recent_failures.push_back(record);
    }

    pub fn status(&self) -> OrchestratorStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> OrchestratorStatus {
        let state = self.state();

        let mut cooling_down: Vec<String> = state
            .cooldowns
            .iter()
            .filter(|(_, until)| **until > now)
            .map(|(id, _)| id.clone())
            .collect();
        cooling_down.sort();

        OrchestratorStatus {
            configured: self.config.configured,
            candidates: self.candidates.iter().map(|c| c.id().to_string()).collect(),
            last_successful: state.last_successful.clone(),
            cooling_down,
            recent_failures: state.recent_failures.iter().cloned().collect(),
        }
    }
}
