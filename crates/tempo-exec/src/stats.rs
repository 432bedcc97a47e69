//! Read-only reporting views over execution rows.
//!
//! Derived aggregates only — nothing here carries invariants of its own.

use serde::{Deserialize, Serialize};

use tempo_core::AccountId;

use crate::error::Result;
use crate::executions::ExecutionStore;

/// Execution counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub timeout: u64,
    pub skipped: u64,
    pub total: u64,
}

/// Summary over a job's (or a whole account's) executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub counts: StatusCounts,
    /// completed / (completed + failed + timeout); 0.0 with no finished runs.
    pub success_rate: f64,
    pub average_duration_ms: Option<f64>,
}

/// Per-day execution totals (UTC calendar days).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStat {
    /// `YYYY-MM-DD`.
    pub day: String,
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub timeout: u64,
}

impl ExecutionStore {
    /// Status counts, success rate and mean duration — account-wide, or for
    /// one job when `job_id` is given.
    pub fn summary(&self, account: &AccountId, job_id: Option<&str>) -> Result<ExecutionSummary> {
        let db = self.db.lock().unwrap();
        let (counts, average_duration_ms) = db.query_row(
            "SELECT
                 COALESCE(SUM(status = 'pending'), 0),
                 COALESCE(SUM(status = 'running'), 0),
                 COALESCE(SUM(status = 'completed'), 0),
                 COALESCE(SUM(status = 'failed'), 0),
                 COALESCE(SUM(status = 'timeout'), 0),
                 COALESCE(SUM(status = 'skipped'), 0),
                 COUNT(*),
                 AVG(duration_ms)
             FROM executions
             WHERE account_id = ?1 AND deleted_at IS NULL
               AND (?2 IS NULL OR job_id = ?2)",
            rusqlite::params![account.as_str(), job_id],
            |row| {
                Ok((
                    StatusCounts {
                        pending: row.get::<_, i64>(0)? as u64,
                        running: row.get::<_, i64>(1)? as u64,
                        completed: row.get::<_, i64>(2)? as u64,
                        failed: row.get::<_, i64>(3)? as u64,
                        timeout: row.get::<_, i64>(4)? as u64,
                        skipped: row.get::<_, i64>(5)? as u64,
                        total: row.get::<_, i64>(6)? as u64,
                    },
                    row.get::<_, Option<f64>>(7)?,
                ))
            },
        )?;

        let finished = counts.completed + counts.failed + counts.timeout;
        let success_rate = if finished == 0 {
            0.0
        } else {
            counts.completed as f64 / finished as f64
        };

        Ok(ExecutionSummary {
            counts,
            success_rate,
            average_duration_ms,
        })
    }

    /// Daily totals over the most recent `days` calendar days that have any
    /// executions, newest first.
    pub fn per_day(&self, account: &AccountId, days: u32) -> Result<Vec<DailyStat>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT substr(scheduled_at, 1, 10) AS day,
                    COUNT(*),
                    COALESCE(SUM(status = 'completed'), 0),
                    COALESCE(SUM(status = 'failed'), 0),
                    COALESCE(SUM(status = 'timeout'), 0)
             FROM executions
             WHERE account_id = ?1 AND deleted_at IS NULL
             GROUP BY day
             ORDER BY day DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![account.as_str(), days as i64], |row| {
            Ok(DailyStat {
                day: row.get(0)?,
                total: row.get::<_, i64>(1)? as u64,
                completed: row.get::<_, i64>(2)? as u64,
                failed: row.get::<_, i64>(3)? as u64,
                timeout: row.get::<_, i64>(4)? as u64,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}
