use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, instrument};
use uuid::Uuid;

use tempo_core::{AccountId, ActorId, Clock, Subject};

use crate::db::init_db;
use crate::diff;
use crate::error::{LedgerError, Result};
use crate::types::{DiffSummary, Version};

/// Thread-safe manager for append-only version history.
///
/// Wraps its own SQLite connection in a `Mutex`; content writes run through
/// `tempo_content`'s `*_in` functions on the same transaction so a failure
/// anywhere rolls the hash storage, reference counts and the current-pointer
/// flip back together.
pub struct VersionLedger {
    db: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl VersionLedger {
    /// Wrap a connection, initialising the ledger and content schemas.
    pub fn new(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        tempo_content::db::init_db(&conn)?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            clock,
        })
    }

    /// Append a new version of `subject` and flip the current pointer to it.
    #[instrument(skip(self, source), fields(account = %account, subject = %subject))]
    pub fn record_version(
        &self,
        account: &AccountId,
        subject: &Subject,
        source: &str,
        description: &str,
        actor: &ActorId,
    ) -> Result<Version> {
        let now = self.clock.now();
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let version = record_version_in(&tx, now, account, subject, source, description, actor)?;
        tx.commit()?;
        Ok(version)
    }

    /// The single version of `subject` currently marked authoritative.
    pub fn current_version(&self, account: &AccountId, subject: &Subject) -> Result<Version> {
        let conn = self.db.lock().unwrap();
        current_version_in(&conn, account, subject)?.ok_or_else(|| LedgerError::NotFound {
            subject: subject.to_string(),
        })
    }

    /// Version history for `subject`, newest first.
    pub fn history(
        &self,
        account: &AccountId,
        subject: &Subject,
        limit: usize,
    ) -> Result<Vec<Version>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, subject_kind, subject_id, version_number, content_hash, is_current,
                    change_description, diff_summary, created_by, created_at
             FROM versions
             WHERE account_id = ?1 AND subject_kind = ?2 AND subject_id = ?3
             ORDER BY version_number DESC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![
                account.as_str(),
                subject.kind.to_string(),
                subject.id,
                limit as i64
            ],
            row_to_version,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// A specific version of `subject` by number.
    pub fn version(&self, account: &AccountId, subject: &Subject, number: i64) -> Result<Version> {
        let conn = self.db.lock().unwrap();
        version_in(&conn, account, subject, number)
    }

    /// Decompressed source text of a specific version.
    pub fn source_at(&self, account: &AccountId, subject: &Subject, number: i64) -> Result<String> {
        let conn = self.db.lock().unwrap();
        let version = version_in(&conn, account, subject, number)?;
        Ok(tempo_content::get_in(
            &conn,
            account,
            subject.kind,
            &version.content_hash,
        )?)
    }

    /// Line-count diff going from version `a` to version `b`.
    #[instrument(skip(self), fields(account = %account, subject = %subject, a, b))]
    pub fn diff(
        &self,
        account: &AccountId,
        subject: &Subject,
        a: i64,
        b: i64,
    ) -> Result<DiffSummary> {
        let conn = self.db.lock().unwrap();
        let from = version_in(&conn, account, subject, a)?;
        let to = version_in(&conn, account, subject, b)?;
        let before = tempo_content::get_in(&conn, account, subject.kind, &from.content_hash)?;
        let after = tempo_content::get_in(&conn, account, subject.kind, &to.content_hash)?;
        Ok(diff::summarize(&before, &after, a, b))
    }

    /// Make an old version current again by appending a new version that
    /// points at its hash. The target and everything in between stay
    /// untouched.
    #[instrument(skip(self), fields(account = %account, subject = %subject, target))]
    pub fn rollback(
        &self,
        account: &AccountId,
        subject: &Subject,
        target: i64,
        actor: &ActorId,
    ) -> Result<Version> {
        let now = self.clock.now();
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let old = version_in(&tx, account, subject, target)?;
        let source = tempo_content::get_in(&tx, account, subject.kind, &old.content_hash)?;
        let version = record_version_in(
            &tx,
            now,
            account,
            subject,
            &source,
            &format!("rollback to v{target}"),
            actor,
        )?;
        tx.commit()?;
        debug!(new_version = version.version_number, "rolled back");
        Ok(version)
    }
}

// ── transaction-composable operations ────────────────────────────────────────

/// Append a version of `subject` on the caller's connection.
///
/// Stores the content (dedup + refcount bump), computes the next version
/// number as `max + 1`, clears the previous current flag, inserts the new
/// row with a diff summary against the previous source, and releases the
/// superseded hash when it differs.
pub fn record_version_in(
    conn: &Connection,
    now: DateTime<Utc>,
    account: &AccountId,
    subject: &Subject,
    source: &str,
    description: &str,
    actor: &ActorId,
) -> Result<Version> {
    let previous = current_version_in(conn, account, subject)?;
    let previous_source = match &previous {
        Some(prev) => Some(tempo_content::get_in(
            conn,
            account,
            subject.kind,
            &prev.content_hash,
        )?),
        None => None,
    };

    let hash = tempo_content::put_in(conn, account, subject.kind, source)?;

    let next_number: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version_number), 0) + 1 FROM versions
         WHERE account_id = ?1 AND subject_kind = ?2 AND subject_id = ?3",
        rusqlite::params![account.as_str(), subject.kind.to_string(), subject.id],
        |row| row.get(0),
    )?;

    let diff_summary = previous.as_ref().zip(previous_source.as_ref()).map(
        |(prev, prev_source)| {
            diff::summarize(prev_source, source, prev.version_number, next_number)
        },
    );
    let diff_json = diff_summary
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "UPDATE versions SET is_current = 0
         WHERE account_id = ?1 AND subject_kind = ?2 AND subject_id = ?3 AND is_current = 1",
        rusqlite::params![account.as_str(), subject.kind.to_string(), subject.id],
    )?;

    let id = Uuid::now_v7().to_string();
    let now_str = now.to_rfc3339();
    conn.execute(
        "INSERT INTO versions
         (id, account_id, subject_kind, subject_id, version_number, content_hash,
          is_current, change_description, diff_summary, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            id,
            account.as_str(),
            subject.kind.to_string(),
            subject.id,
            next_number,
            hash,
            description,
            diff_json,
            actor.as_str(),
            now_str
        ],
    )?;

    // The superseded version no longer holds a live reference.
    if let Some(prev) = &previous {
        if prev.content_hash != hash {
            tempo_content::release_in(conn, account, subject.kind, &prev.content_hash)?;
        }
    }

    debug!(subject = %subject, version = next_number, %hash, "version recorded");

    Ok(Version {
        id,
        subject: subject.clone(),
        version_number: next_number,
        content_hash: hash,
        is_current: true,
        change_description: description.to_string(),
        diff_summary,
        created_by: actor.as_str().to_string(),
        created_at: now_str,
    })
}

/// Current version of `subject` on the caller's connection, if any.
pub fn current_version_in(
    conn: &Connection,
    account: &AccountId,
    subject: &Subject,
) -> Result<Option<Version>> {
    match conn.query_row(
        "SELECT id, subject_kind, subject_id, version_number, content_hash, is_current,
                change_description, diff_summary, created_by, created_at
         FROM versions
         WHERE account_id = ?1 AND subject_kind = ?2 AND subject_id = ?3 AND is_current = 1",
        rusqlite::params![account.as_str(), subject.kind.to_string(), subject.id],
        row_to_version,
    ) {
        Ok(version) => Ok(Some(version)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(LedgerError::Database(e)),
    }
}

fn version_in(
    conn: &Connection,
    account: &AccountId,
    subject: &Subject,
    number: i64,
) -> Result<Version> {
    conn.query_row(
        "SELECT id, subject_kind, subject_id, version_number, content_hash, is_current,
                change_description, diff_summary, created_by, created_at
         FROM versions
         WHERE account_id = ?1 AND subject_kind = ?2 AND subject_id = ?3 AND version_number = ?4",
        rusqlite::params![
            account.as_str(),
            subject.kind.to_string(),
            subject.id,
            number
        ],
        row_to_version,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => LedgerError::VersionNotFound {
            subject: subject.to_string(),
            number,
        },
        other => LedgerError::Database(other),
    })
}

/// Map a SQLite row to a `Version`.
fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<Version> {
    let kind_str: String = row.get(1)?;
    let kind = kind_str
        .parse()
        .unwrap_or(tempo_core::SubjectKind::Function);
    let diff_json: Option<String> = row.get(7)?;
    let diff_summary = diff_json.and_then(|json| serde_json::from_str(&json).ok());

    Ok(Version {
        id: row.get(0)?,
        subject: Subject {
            kind,
            id: row.get(2)?,
        },
        version_number: row.get(3)?,
        content_hash: row.get(4)?,
        is_current: row.get::<_, i64>(5)? != 0,
        change_description: row.get(6)?,
        diff_summary,
        created_by: row.get(8)?,
        created_at: row.get(9)?,
    })
}
