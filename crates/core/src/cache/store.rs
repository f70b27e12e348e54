//! Fingerprint cache operations.
//!
//! Entries expire `ttl` after insertion. When an insert pushes the table over
//! `max_entries`, expired rows are evicted first, then the oldest inserted
//! rows. Reads do not refresh an entry's position.

use super::connection::CacheDb;
use crate::Error;
use crate::verdict::AnalysisResult;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_rusqlite::{params, rusqlite};

/// Cache introspection for the statistics surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: u64,
    pub valid_entries: u64,
    pub expired_entries: u64,
    pub max_size: usize,
    pub utilization_percent: f64,
    pub ttl_minutes: u64,
}

/// Memoizes completed analyses keyed by input fingerprint.
#[derive(Clone, Debug)]
pub struct ResultCache {
    db: CacheDb,
    ttl: Duration,
    max_entries: usize,
}

impl ResultCache {
    pub fn new(db: CacheDb, ttl: Duration, max_entries: usize) -> Self {
        Self { db, ttl, max_entries: max_entries.max(1) }
    }

    /// Look up a fresh result.
    pub async fn get(&self, fingerprint: &str) -> Result<Option<AnalysisResult>, Error> {
        self.get_at(fingerprint, Utc::now()).await
    }

    /// Look up a result that is still fresh at `now`.
    ///
    /// Expired rows are treated as absent; they stay in the table until the
    /// next sweep or eviction.
    pub async fn get_at(&self, fingerprint: &str, now: DateTime<Utc>) -> Result<Option<AnalysisResult>, Error> {
        let fingerprint = fingerprint.to_string();
        let now_ms = now.timestamp_millis();

        let json = self
            .db
            .conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row(
                    "SELECT result_json FROM fingerprints WHERE fingerprint = ?1 AND expires_at_ms > ?2",
                    params![fingerprint, now_ms],
                    |row| row.get(0),
                );

                match result {
                    Ok(json) => Ok(Some(json)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        json.map(|j| serde_json::from_str(&j).map_err(Error::from)).transpose()
    }

    /// Store a result, evicting as needed to stay within capacity.
    ///
    /// Returns the number of evicted entries.
    pub async fn put(&self, fingerprint: &str, result: &AnalysisResult) -> Result<u64, Error> {
        self.put_at(fingerprint, result, Utc::now()).await
    }

    /// Store a result as if inserted at `now`.
    pub async fn put_at(&self, fingerprint: &str, result: &AnalysisResult, now: DateTime<Utc>) -> Result<u64, Error> {
        let fingerprint = fingerprint.to_string();
        let json = serde_json::to_string(result)?;
        let created_at_ms = now.timestamp_millis();
        let expires_at_ms = created_at_ms.saturating_add(self.ttl.as_millis() as i64);
        let max = self.max_entries as i64;

        let evicted = self
            .db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.unchecked_transaction()?;

                tx.execute(
                    "INSERT INTO fingerprints (fingerprint, result_json, created_at_ms, expires_at_ms)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(fingerprint) DO UPDATE SET
                        result_json = excluded.result_json,
                        created_at_ms = excluded.created_at_ms,
                        expires_at_ms = excluded.expires_at_ms",
                    params![fingerprint, json, created_at_ms, expires_at_ms],
                )?;

                let count: i64 = tx.query_row("SELECT COUNT(*) FROM fingerprints", [], |row| row.get(0))?;
                let mut evicted = 0i64;

                if count > max {
                    let excess = count - max;
                    evicted += tx.execute(
                        "DELETE FROM fingerprints WHERE fingerprint IN (
                            SELECT fingerprint FROM fingerprints
                            WHERE expires_at_ms <= ?1
                            ORDER BY created_at_ms ASC, rowid ASC LIMIT ?2
                        )",
                        params![created_at_ms, excess],
                    )? as i64;

                    if excess > evicted {
                        evicted += tx.execute(
                            "DELETE FROM fingerprints WHERE fingerprint IN (
                                SELECT fingerprint FROM fingerprints
                                WHERE fingerprint != ?1
                                ORDER BY created_at_ms ASC, rowid ASC LIMIT ?2
                            )",
                            params![fingerprint, excess - evicted],
                        )? as i64;
                    }
                }

                tx.commit()?;
                Ok(evicted as u64)
            })
            .await
            .map_err(Error::from)?;

        if evicted > 0 {
            tracing::debug!(evicted, "result cache over capacity");
        }

        Ok(evicted)
    }

    pub async fn stats(&self) -> Result<CacheStats, Error> {
        self.stats_at(Utc::now()).await
    }

    /// Entry counts as seen at `now`; lazily expired rows count as expired.
    pub async fn stats_at(&self, now: DateTime<Utc>) -> Result<CacheStats, Error> {
        let now_ms = now.timestamp_millis();
        let (total, valid) = self
            .db
            .conn
            .call(move |conn| -> Result<(i64, i64), Error> {
                let counts = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(CASE WHEN expires_at_ms > ?1 THEN 1 ELSE 0 END), 0)
                    FROM fingerprints",
                    params![now_ms],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Ok(counts)
            })
            .await
            .map_err(Error::from)?;

        let total = total.max(0) as u64;
        let valid = valid.max(0) as u64;
        let utilization = total as f64 / self.max_entries as f64 * 100.0;

        Ok(CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total.saturating_sub(valid),
            max_size: self.max_entries,
            utilization_percent: (utilization * 100.0).round() / 100.0,
            ttl_minutes: self.ttl.as_secs() / 60,
        })
    }

    /// Delete expired entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        self.purge_expired_at(Utc::now()).await
    }

    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let now_ms = now.timestamp_millis();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM fingerprints WHERE expires_at_ms <= ?1", params![now_ms])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Purge expired entries on a fixed interval until the task is aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match cache.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "swept expired cache entries"),
                    Err(e) => tracing::warn!(error = %e, "cache sweep failed"),
                }
            }
        })
    }
}
