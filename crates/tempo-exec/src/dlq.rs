//! Dead-letter accounting, shared by the finish path and the reaper.
//!
//! Every failed or timed-out finish bumps the job's failure streak; a
//! completed finish resets it. Crossing the job's threshold quarantines it:
//! the due-job sweep and `enqueue` skip quarantined jobs until a human
//! calls [`crate::JobStore::recover`].

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::warn;

use tempo_core::AccountId;

use crate::error::{ExecError, Result};

/// Outcome of one failure increment.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FailureAccount {
    /// The streak after this failure.
    pub consecutive: u32,
    /// The job is quarantined (whether it just entered or already was).
    pub in_dead_letter: bool,
    /// This failure is the one that crossed the threshold.
    pub entered_now: bool,
}

/// Bump `consecutive_failures` and quarantine the job when the streak
/// crosses its threshold. Runs on the caller's connection/transaction.
pub(crate) fn record_failure_in(
    conn: &Connection,
    now: DateTime<Utc>,
    account: &AccountId,
    job_id: &str,
    reason: &str,
) -> Result<FailureAccount> {
    let now_str = now.to_rfc3339();
    // Single atomic increment — no read-modify-write window.
    let changed = conn.execute(
        "UPDATE jobs SET consecutive_failures = consecutive_failures + 1, updated_at = ?1
         WHERE account_id = ?2 AND id = ?3",
        rusqlite::params![now_str, account.as_str(), job_id],
    )?;
    if changed == 0 {
        return Err(ExecError::JobNotFound {
            id: job_id.to_string(),
        });
    }

    let (consecutive, threshold, already_quarantined): (u32, u32, bool) = conn.query_row(
        "SELECT consecutive_failures, dead_letter_threshold, in_dead_letter_queue
         FROM jobs WHERE account_id = ?1 AND id = ?2",
        rusqlite::params![account.as_str(), job_id],
        |row| {
            Ok((
                row.get::<_, i64>(0)? as u32,
                row.get::<_, i64>(1)? as u32,
                row.get::<_, i64>(2)? != 0,
            ))
        },
    )?;

    if already_quarantined {
        return Ok(FailureAccount {
            consecutive,
            in_dead_letter: true,
            entered_now: false,
        });
    }

    if consecutive >= threshold {
        let reason = format!("{consecutive} consecutive failures: {reason}");
        conn.execute(
            "UPDATE jobs SET in_dead_letter_queue = 1, dead_letter_reason = ?1,
                 dead_letter_since = ?2, updated_at = ?2
             WHERE account_id = ?3 AND id = ?4",
            rusqlite::params![reason, now_str, account.as_str(), job_id],
        )?;
        warn!(job_id, consecutive, "job moved to dead-letter queue");
        return Ok(FailureAccount {
            consecutive,
            in_dead_letter: true,
            entered_now: true,
        });
    }

    Ok(FailureAccount {
        consecutive,
        in_dead_letter: false,
        entered_now: false,
    })
}

/// Reset the failure streak after a successful finish.
pub(crate) fn record_success_in(
    conn: &Connection,
    now: DateTime<Utc>,
    account: &AccountId,
    job_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE jobs SET consecutive_failures = 0, updated_at = ?1
         WHERE account_id = ?2 AND id = ?3",
        rusqlite::params![now.to_rfc3339(), account.as_str(), job_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::db::init_db;

    fn setup() -> (Connection, AccountId, String) {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        init_db(&conn).expect("init schema");
        let account = AccountId::new("acct-1");
        conn.execute(
            "INSERT INTO jobs (id, account_id, name, schedule, dead_letter_threshold,
                               created_by, created_at, updated_at)
             VALUES ('job-1', 'acct-1', 'flaky', '{}', 3, 'u-1', 't', 't')",
            [],
        )
        .expect("insert job");
        (conn, account, "job-1".to_string())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 9, 10, 0, 0).unwrap()
    }

    #[test]
    fn streak_increments_until_threshold() {
        let (conn, account, job_id) = setup();

        let first = record_failure_in(&conn, now(), &account, &job_id, "boom").unwrap();
        assert_eq!(first.consecutive, 1);
        assert!(!first.in_dead_letter);

        let second = record_failure_in(&conn, now(), &account, &job_id, "boom").unwrap();
        assert_eq!(second.consecutive, 2);
        assert!(!second.in_dead_letter);

        let third = record_failure_in(&conn, now(), &account, &job_id, "boom").unwrap();
        assert_eq!(third.consecutive, 3);
        assert!(third.in_dead_letter);
        assert!(third.entered_now);

        let reason: String = conn
            .query_row("SELECT dead_letter_reason FROM jobs WHERE id = 'job-1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert!(reason.contains("3 consecutive failures"));
    }

    #[test]
    fn success_resets_streak() {
        let (conn, account, job_id) = setup();
        record_failure_in(&conn, now(), &account, &job_id, "boom").unwrap();
        record_failure_in(&conn, now(), &account, &job_id, "boom").unwrap();

        record_success_in(&conn, now(), &account, &job_id).unwrap();
        let streak: i64 = conn
            .query_row("SELECT consecutive_failures FROM jobs WHERE id = 'job-1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(streak, 0);

        // The streak starts over — one more failure is 1, not 3.
        let next = record_failure_in(&conn, now(), &account, &job_id, "boom").unwrap();
        assert_eq!(next.consecutive, 1);
        assert!(!next.in_dead_letter);
    }

    #[test]
    fn further_failures_after_quarantine_do_not_reenter() {
        let (conn, account, job_id) = setup();
        for _ in 0..3 {
            record_failure_in(&conn, now(), &account, &job_id, "boom").unwrap();
        }
        let after = record_failure_in(&conn, now(), &account, &job_id, "boom").unwrap();
        assert_eq!(after.consecutive, 4);
        assert!(after.in_dead_letter);
        assert!(!after.entered_now, "already quarantined");
    }

    #[test]
    fn unknown_job_is_not_found() {
        let (conn, account, _) = setup();
        let err = record_failure_in(&conn, now(), &account, "ghost", "boom").unwrap_err();
        assert!(matches!(err, ExecError::JobNotFound { .. }));
    }
}
